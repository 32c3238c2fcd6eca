//! Backing memory - the only boundary to the surrounding memory system
//!
//! Design: pools and pool sets never touch a global allocator directly.
//! Every byte of slot storage, every occupancy bitmap and every overflow
//! allocation comes through a `BackingAllocator`:
//! - `SystemHeap`: process heap, size header in front of each block
//! - `Arena`: one fixed block, bump allocation, free is a no-op

mod arena;
mod heap;

pub use arena::Arena;
pub use heap::SystemHeap;

use core::ptr::NonNull;

/// Alignment of every block handed out by the bundled backings
pub const BLOCK_ALIGN: usize = 16;

/// Low-level allocate/free capability injected into pools and pool sets
pub trait BackingAllocator {
    /// Allocate `size` bytes, `None` when the backing is exhausted
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Release a block previously returned by `allocate`
    ///
    /// # Safety
    /// `ptr` must come from `allocate` on this same backing and must not
    /// have been freed already.
    unsafe fn free(&self, ptr: NonNull<u8>);
}

impl<T: BackingAllocator + ?Sized> BackingAllocator for &T {
    #[inline]
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        (**self).allocate(size)
    }

    #[inline]
    unsafe fn free(&self, ptr: NonNull<u8>) {
        (**self).free(ptr)
    }
}

/// Align upward to the next multiple of `align` (power of two)
#[inline(always)]
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value.wrapping_add(align).wrapping_sub(1)) & !align.wrapping_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
    }

    #[test]
    fn borrowed_backing_delegates() {
        let arena = Arena::new(256).expect("arena");
        let backing = &arena;

        backing.allocate(32).expect("alloc through reference");
        assert_eq!(arena.used(), 32);
    }
}
