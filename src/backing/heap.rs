//! Process heap backing
//!
//! `free` only receives a pointer, so each block carries its own size in a
//! 16-byte header placed just before the returned address.

use super::{BackingAllocator, BLOCK_ALIGN};
use core::ptr::NonNull;
use std::alloc::{alloc, dealloc, Layout};

/// Header size; equal to the alignment so the payload stays aligned
const HEADER_SIZE: usize = BLOCK_ALIGN;

/// Stateless handle to the process heap
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHeap;

impl SystemHeap {
    pub const fn new() -> Self {
        SystemHeap
    }
}

impl BackingAllocator for SystemHeap {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let total = size.checked_add(HEADER_SIZE)?;
        let layout = Layout::from_size_align(total, BLOCK_ALIGN).ok()?;

        let start = NonNull::new(unsafe { alloc(layout) })?;

        unsafe {
            start.as_ptr().cast::<usize>().write(total);
            Some(NonNull::new_unchecked(start.as_ptr().add(HEADER_SIZE)))
        }
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        let start = ptr.as_ptr().sub(HEADER_SIZE);
        let total = start.cast::<usize>().read();
        dealloc(start, Layout::from_size_align_unchecked(total, BLOCK_ALIGN));
    }
}
