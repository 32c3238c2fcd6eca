//! Arena backing - one block, bump allocation, no reuse
//!
//! Design: the whole block is acquired once from the process heap; requests
//! are served by bumping an offset. `free` does nothing, the block is
//! returned on drop. Suitable for provisioning pools whose lifetime matches
//! the arena's.

use super::{align_up, BackingAllocator, BLOCK_ALIGN};
use core::cell::Cell;
use core::ptr::NonNull;
use std::alloc::{alloc, dealloc, Layout};
use tracing::trace;

pub struct Arena {
    start: NonNull<u8>,
    layout: Layout,
    capacity: usize,
    offset: Cell<usize>,
}

impl Arena {
    /// Acquire a block of `capacity` bytes, `None` if the heap refuses
    pub fn new(capacity: usize) -> Option<Self> {
        let layout = Layout::from_size_align(capacity.max(1), BLOCK_ALIGN).ok()?;
        let start = NonNull::new(unsafe { alloc(layout) })?;

        Some(Self {
            start,
            layout,
            capacity,
            offset: Cell::new(0),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes consumed so far, alignment padding included
    #[inline]
    pub fn used(&self) -> usize {
        self.offset.get()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.offset.get())
    }
}

impl BackingAllocator for Arena {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let offset = align_up(self.offset.get(), BLOCK_ALIGN);
        let end = offset.checked_add(size)?;

        if end > self.capacity {
            trace!(target: "poolset::arena", size, remaining = self.remaining(), "arena exhausted");
            return None;
        }

        self.offset.set(end);
        // offset <= capacity, so the result stays inside (or one past) the block
        unsafe { Some(NonNull::new_unchecked(self.start.as_ptr().add(offset))) }
    }

    unsafe fn free(&self, _ptr: NonNull<u8>) {}
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe {
            dealloc(self.start.as_ptr(), self.layout);
        }
    }
}

impl core::fmt::Debug for Arena {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity)
            .field("used", &self.used())
            .finish()
    }
}
