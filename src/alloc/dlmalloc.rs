use std::{mem, ptr::NonNull};

use ::dlmalloc::Dlmalloc;
use log::trace;

use crate::{error::AllocError, util::hint::cold};

use super::{Handle, HeapAdapter};

// https://gee.cs.oswego.edu/dl/html/malloc.html

pub const DLMALLOC_MIN_ALIGN: usize = 8;

/// A private `dlmalloc()` instance. It grows its own arena out of fresh
/// system pages, so nothing else in the process shares its heap. The arena is
/// unmapped when the heap is dropped.
pub struct DlHeap {
    dlmalloc: Dlmalloc,
}

impl DlHeap {
    pub const fn new() -> Self {
        Self {
            dlmalloc: Dlmalloc::new(),
        }
    }
}

impl Default for DlHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DlHeap {
    fn drop(&mut self) {
        // SAFETY: no handle outlives the heap it came from. A `Ledger` releases
        //         every block in its own `drop()` before its heap is dropped.
        let released = unsafe { mem::replace(&mut self.dlmalloc, Dlmalloc::new()).destroy() };
        trace!("dlmalloc arena released {released} bytes");
    }
}

impl HeapAdapter for DlHeap {
    fn allocate(&mut self, size: usize) -> Result<Handle, AllocError> {
        // SAFETY: `DLMALLOC_MIN_ALIGN` is a power of two and the size is
        //         non-zero
        let data = unsafe { self.dlmalloc.malloc(size.max(1), DLMALLOC_MIN_ALIGN) };
        match NonNull::new(data) {
            Some(data) => Ok(Handle::new(data)),
            None => cold(|| Err(AllocError { size })),
        }
    }

    unsafe fn release(&mut self, handle: Handle, size: usize) {
        // SAFETY: identical contract to the caller. The size and alignment
        //         are the ones we passed to `malloc()`.
        unsafe {
            self.dlmalloc
                .free(handle.as_ptr(), size.max(1), DLMALLOC_MIN_ALIGN)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dlmalloc_hands_out_aligned_blocks() {
        let mut heap = DlHeap::new();
        let handles: Vec<_> = (1..=64)
            .map(|size| (heap.allocate(size).unwrap(), size))
            .collect();
        for &(handle, _) in &handles {
            assert_eq!(handle.addr() % DLMALLOC_MIN_ALIGN, 0);
        }
        for (handle, size) in handles {
            unsafe { heap.release(handle, size) };
        }
    }
}
