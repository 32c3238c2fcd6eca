//! Slot pool tests
//!
//! Organised by concern:
//! - Lifecycle: provisioning, disabled pools, terminate
//! - Allocation: hinted search, exhaustion, spills
//! - Ownership: range and alignment tests
//! - Violations: double allocate/free under each policy

use super::*;
use crate::backing::{Arena, SystemHeap};
use core::cell::Cell;

/// Heap backing that counts calls and can be told to fail
#[derive(Default)]
struct Recording {
    allocations: Cell<usize>,
    frees: Cell<usize>,
    fail_after: Cell<Option<usize>>,
}

impl BackingAllocator for Recording {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if let Some(remaining) = self.fail_after.get() {
            if remaining == 0 {
                return None;
            }
            self.fail_after.set(Some(remaining - 1));
        }
        self.allocations.set(self.allocations.get() + 1);
        SystemHeap.allocate(size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        self.frees.set(self.frees.get() + 1);
        SystemHeap.free(ptr)
    }
}

fn pool(num_elements: usize, element_size: usize) -> SlotPool<SystemHeap> {
    SlotPool::new(num_elements, element_size, SystemHeap)
        .expect("pool")
        .with_policy(ViolationPolicy::Ignore)
}

// ===== Lifecycle =====

#[test]
fn new_pool_is_empty_and_available() {
    let pool = pool(10, 32);

    assert!(pool.is_enabled());
    assert_eq!(pool.allocated(), 0);
    assert_eq!(pool.storage_size(), 320);
    assert!((0..10).all(|i| pool.is_available(i)));
    assert_eq!(pool.diagnostics(), PoolDiagnostics {
        element_size: 32,
        num_elements: 10,
        ..Default::default()
    });
}

#[test]
fn zero_elements_gives_disabled_pool() {
    let mut pool = pool(0, 64);

    assert!(!pool.is_enabled());
    assert!(pool.allocate_one().is_none());
    assert_eq!(pool.diagnostics().spills, 0);
}

#[test]
fn zero_element_size_gives_disabled_pool() {
    let mut pool = pool(8, 0);

    assert!(!pool.is_enabled());
    assert!(pool.allocate_one().is_none());
    assert!(!pool.is_available(0));
}

#[test]
fn storage_and_bitmap_come_from_backing() {
    let backing = Recording::default();
    {
        let mut pool = SlotPool::new(20, 16, &backing).expect("pool");
        assert_eq!(backing.allocations.get(), 2);

        pool.terminate();
        assert_eq!(backing.frees.get(), 2);
        assert!(!pool.is_enabled());
        assert_eq!(pool.num_elements(), 0);
    }
    // Drop after terminate releases nothing more
    assert_eq!(backing.frees.get(), 2);
}

#[test]
fn drop_releases_buffers() {
    let backing = Recording::default();
    drop(SlotPool::new(4, 8, &backing).expect("pool"));
    assert_eq!(backing.frees.get(), 2);
}

#[test]
fn failed_storage_releases_bitmap() {
    let backing = Recording::default();
    backing.fail_after.set(Some(1));

    let err = SlotPool::new(4, 1024, &backing).unwrap_err();

    assert_eq!(err, PoolError::OutOfMemory { bytes: 4096 });
    assert_eq!(backing.allocations.get(), 1);
    assert_eq!(backing.frees.get(), 1);
}

#[test]
fn failed_bitmap_reports_failure() {
    let backing = Recording::default();
    backing.fail_after.set(Some(0));

    let err = SlotPool::new(4, 8, &backing).unwrap_err();
    assert_eq!(err, PoolError::OutOfMemory { bytes: 1 });
    assert_eq!(backing.frees.get(), 0);
}

#[test]
fn size_overflow_rejected() {
    let err = SlotPool::new(usize::MAX, 2, SystemHeap).unwrap_err();
    assert_eq!(err, PoolError::SizeOverflow { num_elements: usize::MAX, element_size: 2 });
}

#[test]
fn storage_is_zeroed() {
    let mut pool = pool(4, 64);
    let ptr = pool.allocate_one().expect("slot");

    let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 64) };
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn works_over_an_arena() {
    let arena = Arena::new(4096).expect("arena");
    let mut pool = SlotPool::new(16, 64, &arena).expect("pool");

    let ptr = pool.allocate_one().expect("slot");
    assert!(pool.is_owned(ptr.as_ptr()));
    assert!(arena.used() >= 16 * 64);
}

// ===== Allocation =====

#[test]
fn slots_are_handed_out_in_order() {
    let mut pool = pool(4, 16);

    let addrs: Vec<usize> = (0..4)
        .map(|_| pool.allocate_one().expect("slot").as_ptr() as usize)
        .collect();

    for pair in addrs.windows(2) {
        assert_eq!(pair[1] - pair[0], 16);
    }
    assert_eq!(pool.allocated(), 4);
}

#[test]
fn full_pool_spills() {
    let mut pool = pool(2, 16);

    pool.allocate_one().expect("first");
    pool.allocate_one().expect("second");
    assert!(pool.allocate_one().is_none());
    assert!(pool.allocate_one().is_none());

    let diag = pool.diagnostics();
    assert_eq!(diag.allocations, 2);
    assert_eq!(diag.spills, 2);
}

#[test]
fn freed_slot_is_reused_first() {
    let mut pool = pool(8, 16);

    let ptrs: Vec<_> = (0..5).map(|_| pool.allocate_one().expect("slot")).collect();
    assert_eq!(pool.free_one(ptrs[2].as_ptr()), Some(2));

    let again = pool.allocate_one().expect("reuse");
    assert_eq!(again, ptrs[2]);
}

#[test]
fn search_wraps_past_the_end() {
    let mut pool = pool(4, 8);

    pool.mark_allocated(2).expect("mark");
    pool.mark_allocated(3).expect("mark");
    // hint lands on 2, everything from there to the end is taken
    pool.mark_allocated(1).expect("mark");

    assert_eq!(pool.find_next_available(), Some(0));
}

#[test]
fn hint_moves_forward_after_allocation() {
    let mut pool = pool(4, 8);

    pool.mark_allocated(1).expect("mark");
    assert_eq!(pool.find_next_available(), Some(2));

    pool.mark_allocated(3).expect("mark");
    // hint wrapped to 0
    assert_eq!(pool.find_next_available(), Some(0));
}

#[test]
fn allocated_count_matches_bitmap() {
    let mut pool = pool(32, 8);
    let mut live = Vec::new();

    for round in 0..100 {
        if round % 3 == 2 {
            if let Some(ptr) = live.pop() {
                pool.free_one(ptr);
            }
        } else if let Some(ptr) = pool.allocate_one() {
            live.push(ptr.as_ptr() as *const u8);
        }

        let diag = pool.diagnostics();
        assert_eq!(diag.allocated, live.len());
        assert!(diag.is_consistent());
    }
}

// ===== Ownership =====

#[test]
fn ownership_requires_range_and_alignment() {
    let mut pool = pool(4, 32);
    let first = pool.allocate_one().expect("slot");
    let base = first.as_ptr();

    unsafe {
        assert!(pool.is_owned(base));
        assert!(pool.is_owned(base.add(96)));
        assert!(!pool.is_owned(base.add(1)));
        assert!(!pool.is_owned(base.add(31)));
        assert!(!pool.is_owned(base.add(128)));
        assert!(!pool.is_owned(base.wrapping_sub(32)));
    }
    assert_eq!(pool.index_of(unsafe { base.add(64) }), Some(2));
}

#[test]
fn foreign_address_is_not_freed() {
    let mut pool = pool(4, 32);
    pool.allocate_one().expect("slot");

    let other = [0u8; 8];
    assert_eq!(pool.free_one(other.as_ptr()), None);
    assert_eq!(pool.allocated(), 1);
    assert_eq!(pool.diagnostics().frees, 0);
}

#[test]
fn address_of_matches_index_of() {
    let pool = pool(6, 24);

    for index in 0..6 {
        let ptr = pool.address_of(index).expect("address");
        assert_eq!(pool.index_of(ptr.as_ptr()), Some(index));
    }
    assert!(pool.address_of(6).is_none());
}

#[test]
fn terminated_pool_owns_nothing() {
    let mut pool = pool(4, 32);
    let ptr = pool.allocate_one().expect("slot");

    pool.terminate();

    assert!(!pool.is_owned(ptr.as_ptr()));
    assert!(pool.allocate_one().is_none());
}

// ===== Violations =====

#[test]
fn double_allocation_counted_once() {
    let mut pool = pool(4, 8);

    pool.mark_allocated(1).expect("first mark");
    let err = pool.mark_allocated(1).unwrap_err();

    assert_eq!(err, ProtocolViolation::DoubleAllocation { index: 1 });
    let diag = pool.diagnostics();
    assert_eq!(diag.double_allocations, 1);
    assert_eq!(diag.allocated, 1);
    assert!(diag.is_consistent());
}

#[test]
fn double_free_counted_and_ignored() {
    let mut pool = pool(4, 8);
    let ptr = pool.allocate_one().expect("slot");

    assert_eq!(pool.free_one(ptr.as_ptr()), Some(0));
    assert_eq!(pool.free_one(ptr.as_ptr()), Some(0));

    let diag = pool.diagnostics();
    assert_eq!(diag.frees, 1);
    assert_eq!(diag.double_frees, 1);
    assert_eq!(diag.allocated, 0);
}

#[test]
fn out_of_range_index_is_a_violation() {
    let mut pool = pool(4, 8);

    assert_eq!(
        pool.mark_allocated(4).unwrap_err(),
        ProtocolViolation::IndexOutOfRange { index: 4, num_elements: 4 }
    );
    assert_eq!(pool.allocated(), 0);
}

#[test]
#[should_panic(expected = "Multiple deallocation of slot 0")]
fn panic_policy_on_double_free() {
    let mut pool = SlotPool::new(2, 8, SystemHeap)
        .expect("pool")
        .with_policy(ViolationPolicy::Panic);

    let ptr = pool.allocate_one().expect("slot");
    pool.free_one(ptr.as_ptr());
    pool.free_one(ptr.as_ptr());
}
