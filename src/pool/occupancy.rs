//! Occupancy bitmap - one bit per slot, set means allocated
//!
//! The bytes live in memory obtained from the pool's backing allocator, so
//! the bitmap is a `BitSlice` view over a raw buffer rather than a `BitVec`.

use bitvec::prelude::*;
use core::ptr::NonNull;

pub(super) struct Occupancy {
    bytes: NonNull<u8>,
    byte_len: usize,
    bits: usize,
}

impl Occupancy {
    /// Bytes needed to track `bits` slots
    #[inline]
    pub(super) const fn byte_len(bits: usize) -> usize {
        bits.div_ceil(8)
    }

    /// Take over a raw buffer and clear it
    ///
    /// # Safety
    /// `bytes` must be valid for `Self::byte_len(bits)` bytes and must not be
    /// accessed through any other path while this bitmap exists.
    pub(super) unsafe fn from_raw(bytes: NonNull<u8>, bits: usize) -> Self {
        let byte_len = Self::byte_len(bits);
        core::ptr::write_bytes(bytes.as_ptr(), 0, byte_len);
        Self { bytes, byte_len, bits }
    }

    #[inline]
    fn view(&self) -> &BitSlice<u8, Lsb0> {
        let raw = unsafe { core::slice::from_raw_parts(self.bytes.as_ptr(), self.byte_len) };
        &BitSlice::from_slice(raw)[..self.bits]
    }

    #[inline]
    fn view_mut(&mut self) -> &mut BitSlice<u8, Lsb0> {
        let raw = unsafe { core::slice::from_raw_parts_mut(self.bytes.as_ptr(), self.byte_len) };
        &mut BitSlice::from_slice_mut(raw)[..self.bits]
    }

    #[inline]
    pub(super) fn is_set(&self, index: usize) -> bool {
        self.view()[index]
    }

    #[inline]
    pub(super) fn set(&mut self, index: usize, allocated: bool) {
        self.view_mut().set(index, allocated);
    }

    /// Population count, recomputed from the bits
    pub(super) fn count_ones(&self) -> usize {
        self.view().count_ones()
    }

    /// First clear bit scanning `hint, hint+1, ...` and wrapping to 0
    pub(super) fn first_clear_from(&self, hint: usize) -> Option<usize> {
        let bits = self.view();
        let hint = hint.min(self.bits);

        bits[hint..]
            .first_zero()
            .map(|offset| hint + offset)
            .or_else(|| bits[..hint].first_zero())
    }

    #[inline]
    pub(super) fn as_ptr(&self) -> NonNull<u8> {
        self.bytes
    }
}
