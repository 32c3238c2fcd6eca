//! Slot pool - one size class, fixed slot count, bitmap occupancy
//!
//! Design: storage and bitmap are acquired once from the injected backing
//! allocator and never grow.
//! 1. Allocation: hinted scan of the bitmap, O(1) rejection when full
//! 2. Free: address -> slot index by integer range + alignment test
//! 3. Guarded bit flips: a double allocate/free is a protocol violation
//!
//! Slot `i` lives at `storage + i * element_size`.

mod occupancy;

#[cfg(test)]
mod tests;

use crate::backing::BackingAllocator;
use crate::diagnostics::PoolDiagnostics;
use crate::error::{PoolError, ProtocolViolation, ViolationPolicy};
use core::ptr::NonNull;
use occupancy::Occupancy;
use tracing::{debug, trace};

/// Buffers owned by an enabled pool
struct Buffers {
    storage: NonNull<u8>,
    occupancy: Occupancy,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    allocations: usize,
    frees: usize,
    spills: usize,
    double_allocations: usize,
    double_frees: usize,
}

/// Fixed array of equal-size slots
pub struct SlotPool<B: BackingAllocator> {
    element_size: usize,
    num_elements: usize,
    next_free_hint: usize,
    allocated: usize,
    buffers: Option<Buffers>,
    backing: Option<B>,
    policy: ViolationPolicy,
    counters: Counters,
}

// Buffers are exclusively owned; moving the pool moves that ownership.
unsafe impl<B: BackingAllocator + Send> Send for SlotPool<B> {}

impl<B: BackingAllocator> SlotPool<B> {
    /// Provision `num_elements` slots of `element_size` bytes from `backing`
    ///
    /// A zero count or size yields a pool that never hands out a slot.
    pub fn new(num_elements: usize, element_size: usize, backing: B) -> Result<Self, PoolError> {
        let storage_size = num_elements
            .checked_mul(element_size)
            .ok_or(PoolError::SizeOverflow { num_elements, element_size })?;

        let mut pool = Self {
            element_size,
            num_elements,
            next_free_hint: 0,
            allocated: 0,
            buffers: None,
            backing: None,
            policy: ViolationPolicy::default(),
            counters: Counters::default(),
        };

        if storage_size > 0 {
            pool.buffers = Some(Self::acquire(&backing, num_elements, storage_size)?);
        }
        pool.backing = Some(backing);

        debug!(target: "poolset::pool", element_size, num_elements, "pool created");
        Ok(pool)
    }

    /// Choose how protocol violations are handled from now on
    pub fn with_policy(mut self, policy: ViolationPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn acquire(backing: &B, num_elements: usize, storage_size: usize) -> Result<Buffers, PoolError> {
        let bitmap_size = Occupancy::byte_len(num_elements);
        let bitmap = backing
            .allocate(bitmap_size)
            .ok_or(PoolError::OutOfMemory { bytes: bitmap_size })?;

        let Some(storage) = backing.allocate(storage_size) else {
            unsafe { backing.free(bitmap) };
            return Err(PoolError::OutOfMemory { bytes: storage_size });
        };

        unsafe {
            core::ptr::write_bytes(storage.as_ptr(), 0, storage_size);
            Ok(Buffers {
                storage,
                occupancy: Occupancy::from_raw(bitmap, num_elements),
            })
        }
    }

    /// Release storage and bitmap, leaving a disabled pool
    pub fn terminate(&mut self) {
        if let (Some(buffers), Some(backing)) = (self.buffers.take(), self.backing.as_ref()) {
            unsafe {
                backing.free(buffers.storage);
                backing.free(buffers.occupancy.as_ptr());
            }
            debug!(
                target: "poolset::pool",
                element_size = self.element_size,
                still_allocated = self.allocated,
                "pool terminated"
            );
        }

        self.element_size = 0;
        self.num_elements = 0;
        self.next_free_hint = 0;
        self.allocated = 0;
        self.backing = None;
        self.counters = Counters::default();
    }

    // ===== Accessors =====

    #[inline]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    #[inline]
    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    /// Slots currently handed out
    #[inline]
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Total bytes of slot storage
    #[inline]
    pub fn storage_size(&self) -> usize {
        self.num_elements * self.element_size
    }

    /// Whether the pool can ever hand out a slot
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.buffers.is_some()
    }

    #[inline]
    pub fn policy(&self) -> ViolationPolicy {
        self.policy
    }

    // ===== Slot operations =====

    /// Hand out one slot, `None` when the pool is full or disabled
    pub fn allocate_one(&mut self) -> Option<NonNull<u8>> {
        if !self.is_enabled() {
            return None;
        }

        let Some(index) = self.find_next_available() else {
            self.counters.spills += 1;
            trace!(target: "poolset::pool", element_size = self.element_size, "pool full");
            return None;
        };

        self.mark_allocated(index).ok()?;
        self.counters.allocations += 1;

        let ptr = self.slot_ptr(index)?;
        trace!(target: "poolset::pool", element_size = self.element_size, index, ptr = ?ptr, "slot allocated");
        Some(ptr)
    }

    /// Return a slot by address
    ///
    /// `None` when the address is not the start of a slot of this pool.
    /// When a double free is ignored by the policy the index is still
    /// reported but nothing is counted as freed.
    pub fn free_one(&mut self, address: *const u8) -> Option<usize> {
        let index = self.index_of(address)?;

        if self.mark_available(index).is_ok() {
            self.counters.frees += 1;
            trace!(target: "poolset::pool", element_size = self.element_size, index, "slot freed");
        }
        Some(index)
    }

    /// Hinted scan for a clear bit
    ///
    /// Starts at the hint and wraps; a full pool fails without scanning.
    pub fn find_next_available(&mut self) -> Option<usize> {
        if self.allocated >= self.num_elements {
            return None;
        }

        let index = self.buffers.as_ref()?.occupancy.first_clear_from(self.next_free_hint)?;
        self.next_free_hint = index;
        Some(index)
    }

    /// Whether slot `index` exists and is free
    pub fn is_available(&self, index: usize) -> bool {
        match &self.buffers {
            Some(buffers) if index < self.num_elements => !buffers.occupancy.is_set(index),
            _ => false,
        }
    }

    /// Set the occupancy bit of `index`
    ///
    /// The hint moves to the following slot so allocations spread forward.
    pub fn mark_allocated(&mut self, index: usize) -> Result<(), ProtocolViolation> {
        self.check_index(index)?;
        let num_elements = self.num_elements;

        let Some(buffers) = self.buffers.as_mut() else {
            return Ok(());
        };

        if buffers.occupancy.is_set(index) {
            self.counters.double_allocations += 1;
            return Err(self.policy.enforce(ProtocolViolation::DoubleAllocation { index }));
        }

        buffers.occupancy.set(index, true);
        self.allocated += 1;
        self.next_free_hint = (index + 1) % num_elements;
        Ok(())
    }

    /// Clear the occupancy bit of `index`
    ///
    /// The hint moves to the freed slot so it is reused first.
    pub fn mark_available(&mut self, index: usize) -> Result<(), ProtocolViolation> {
        self.check_index(index)?;

        let Some(buffers) = self.buffers.as_mut() else {
            return Ok(());
        };

        if !buffers.occupancy.is_set(index) {
            self.counters.double_frees += 1;
            return Err(self.policy.enforce(ProtocolViolation::DoubleFree { index }));
        }

        buffers.occupancy.set(index, false);
        self.allocated -= 1;
        self.next_free_hint = index;
        Ok(())
    }

    /// Address of slot `index`; out-of-range indices are a violation
    pub fn address_of(&self, index: usize) -> Option<NonNull<u8>> {
        self.check_index(index).ok()?;
        self.slot_ptr(index)
    }

    // ===== Ownership =====

    /// Slot index for an address that is the exact start of a slot
    pub fn index_of(&self, address: *const u8) -> Option<usize> {
        let base = self.buffers.as_ref()?.storage.as_ptr() as usize;
        let offset = (address as usize).checked_sub(base)?;

        if offset >= self.storage_size() || offset % self.element_size != 0 {
            return None;
        }
        Some(offset / self.element_size)
    }

    /// Whether `address` is the start of a slot in this pool
    #[inline]
    pub fn is_owned(&self, address: *const u8) -> bool {
        self.index_of(address).is_some()
    }

    pub fn diagnostics(&self) -> PoolDiagnostics {
        PoolDiagnostics {
            element_size: self.element_size,
            num_elements: self.num_elements,
            allocated: self.allocated,
            allocated_in_bitmap: self
                .buffers
                .as_ref()
                .map_or(0, |buffers| buffers.occupancy.count_ones()),
            double_allocations: self.counters.double_allocations,
            double_frees: self.counters.double_frees,
            allocations: self.counters.allocations,
            frees: self.counters.frees,
            spills: self.counters.spills,
        }
    }

    fn check_index(&self, index: usize) -> Result<(), ProtocolViolation> {
        if index < self.num_elements && self.buffers.is_some() {
            return Ok(());
        }
        Err(self.policy.enforce(ProtocolViolation::IndexOutOfRange {
            index,
            num_elements: self.num_elements,
        }))
    }

    /// Caller guarantees `index < num_elements`
    #[inline]
    fn slot_ptr(&self, index: usize) -> Option<NonNull<u8>> {
        debug_assert!(index < self.num_elements);
        let storage = self.buffers.as_ref()?.storage;
        unsafe { Some(NonNull::new_unchecked(storage.as_ptr().add(index * self.element_size))) }
    }
}

impl<B: BackingAllocator> Drop for SlotPool<B> {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl<B: BackingAllocator> core::fmt::Debug for SlotPool<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SlotPool")
            .field("element_size", &self.element_size)
            .field("num_elements", &self.num_elements)
            .field("allocated", &self.allocated)
            .field("next_free_hint", &self.next_free_hint)
            .finish()
    }
}
