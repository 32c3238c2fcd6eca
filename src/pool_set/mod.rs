//! Pool set - size-class routing over an ordered list of slot pools
//!
//! Design: three-layer fallback for every request:
//! 1. First pool (insertion order) whose slots fit the request
//! 2. Later fitting pools when that one is full
//! 3. The overflow allocator when every fitting pool is full
//!
//! Frees are routed back purely from the address: the first pool whose
//! storage contains it as a slot start takes it, otherwise it goes to the
//! overflow allocator.


use crate::backing::BackingAllocator;
use crate::diagnostics::PoolSetDiagnostics;
use crate::error::{PoolError, ViolationPolicy};
use crate::pool::SlotPool;
use core::ptr::NonNull;
use tracing::{debug, trace, warn};

/// Default bound on the number of pools in a set
pub const DEFAULT_CAPACITY: usize = 16;

/// Index-based name of a slot: which pool, which slot in it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    pub pool: usize,
    pub slot: usize,
}

/// Result of the ownership search for an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Pool(SlotHandle),
    /// No pool claims it; it belongs to the overflow allocator if anything
    Unpooled,
}

pub struct PoolSet<B: BackingAllocator + Clone> {
    name: String,
    pools: Vec<SlotPool<B>>,
    capacity: usize,
    backing: Option<B>,
    overflow: bool,
    policy: ViolationPolicy,
    spills_handled: usize,
    spills_to_overflow: usize,
    frees_to_overflow: usize,
}

impl<B: BackingAllocator + Clone> PoolSet<B> {
    /// Empty set that provisions pools from `backing` and overflows into it
    pub fn new(name: impl Into<String>, backing: B) -> Self {
        Self {
            name: name.into(),
            pools: Vec::with_capacity(DEFAULT_CAPACITY),
            capacity: DEFAULT_CAPACITY,
            backing: Some(backing),
            overflow: true,
            policy: ViolationPolicy::default(),
            spills_handled: 0,
            spills_to_overflow: 0,
            frees_to_overflow: 0,
        }
    }

    /// Bound the number of pools
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self.pools.reserve(capacity.saturating_sub(self.pools.len()));
        self
    }

    /// Keep using the backing for pool storage but never for requests
    pub fn without_overflow(mut self) -> Self {
        self.overflow = false;
        self
    }

    /// Violation policy handed to every pool added afterwards
    pub fn with_policy(mut self, policy: ViolationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Append a pool; its position is its routing priority
    pub fn add_pool(&mut self, element_size: usize, num_elements: usize) -> Result<(), PoolError> {
        let backing = self.backing.as_ref().ok_or(PoolError::Terminated)?;

        if self.pools.len() >= self.capacity {
            return Err(PoolError::CapacityReached { capacity: self.capacity });
        }

        let pool = SlotPool::new(num_elements, element_size, backing.clone())?.with_policy(self.policy);
        self.pools.push(pool);
        Ok(())
    }

    /// Route a request of `size` bytes
    ///
    /// A pool fits when `size <= element_size`. Pools are tried in
    /// insertion order, not by best fit.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        for (index, pool) in self.pools.iter_mut().enumerate() {
            if size > pool.element_size() {
                continue;
            }
            if let Some(ptr) = pool.allocate_one() {
                return Some(ptr);
            }
            self.spills_handled += 1;
            debug!(target: "poolset", set = %self.name, pool = index, size, "pool full, spilling");
        }

        if !self.overflow {
            warn!(target: "poolset", set = %self.name, size, "no pool can serve request");
            return None;
        }

        let backing = self.backing.as_ref()?;
        self.spills_to_overflow += 1;
        let ptr = backing.allocate(size);
        warn!(target: "poolset", set = %self.name, size, served = ptr.is_some(), "spilled to overflow allocator");
        ptr
    }

    /// Give back memory obtained from `allocate`; null is ignored
    ///
    /// Addresses no pool claims go to the overflow allocator, or are
    /// dropped silently when the set has none.
    ///
    /// # Safety
    /// `ptr` must be null or a live address returned by `allocate` on this
    /// set.
    pub unsafe fn deallocate(&mut self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };

        match self.owner_of(ptr.as_ptr()) {
            Owner::Pool(handle) => {
                self.pools[handle.pool].free_one(ptr.as_ptr());
            }
            Owner::Unpooled => {
                let Some(backing) = self.backing.as_ref().filter(|_| self.overflow) else {
                    trace!(target: "poolset", set = %self.name, ptr = ?ptr, "unrecognised address ignored");
                    return;
                };
                self.frees_to_overflow += 1;
                trace!(target: "poolset", set = %self.name, ptr = ?ptr, "freed to overflow allocator");
                backing.free(ptr);
            }
        }
    }

    /// Which pool and slot, if any, `address` belongs to
    pub fn owner_of(&self, address: *const u8) -> Owner {
        self.pools
            .iter()
            .enumerate()
            .find_map(|(pool, p)| p.index_of(address).map(|slot| SlotHandle { pool, slot }))
            .map_or(Owner::Unpooled, Owner::Pool)
    }

    /// Address of the slot a handle names
    pub fn address_of(&self, handle: SlotHandle) -> Option<NonNull<u8>> {
        self.pools.get(handle.pool)?.address_of(handle.slot)
    }

    /// Terminate every pool and drop the backing
    ///
    /// Later requests fail and later frees of unpooled addresses are ignored.
    pub fn terminate(&mut self) {
        debug!(
            target: "poolset",
            set = %self.name,
            pools = self.pools.len(),
            still_allocated = self.total_allocated(),
            "pool set terminating"
        );

        for pool in &mut self.pools {
            pool.terminate();
        }
        self.backing = None;
    }

    // ===== Accessors =====

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn has_overflow(&self) -> bool {
        self.overflow && self.backing.is_some()
    }

    pub fn pool(&self, index: usize) -> Option<&SlotPool<B>> {
        self.pools.get(index)
    }

    pub fn pools(&self) -> impl Iterator<Item = &SlotPool<B>> {
        self.pools.iter()
    }

    /// Slots still handed out across all pools
    pub fn total_allocated(&self) -> usize {
        self.pools.iter().map(SlotPool::allocated).sum()
    }

    pub fn diagnostics(&self) -> PoolSetDiagnostics {
        PoolSetDiagnostics {
            name: self.name.clone(),
            pools: self.pools.iter().map(SlotPool::diagnostics).collect(),
            total_allocated: self.total_allocated(),
            spills_handled: self.spills_handled,
            spills_to_overflow: self.spills_to_overflow,
            frees_to_overflow: self.frees_to_overflow,
        }
    }
}

impl<B: BackingAllocator + Clone> core::fmt::Debug for PoolSet<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PoolSet")
            .field("name", &self.name)
            .field("pools", &self.pools)
            .field("overflow", &self.has_overflow())
            .finish()
    }
}
