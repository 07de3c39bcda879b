use std::ptr::NonNull;

use crate::{error::AllocError, util::hint::cold};

use super::{Handle, HeapAdapter};

/// The process heap, through plain `malloc()` and `free()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibcHeap;

/// This is just a regular allocator function, without any metadata stored.
/// `malloc(0)` is allowed to return null, so zero-sized requests are bumped to
/// a single byte.
pub fn malloc(size: usize) -> Result<NonNull<u8>, AllocError> {
    // SAFETY: `malloc()` has no preconditions
    let data = unsafe { libc::malloc(size.max(1)) };
    match NonNull::new(data as *mut u8) {
        Some(data) => Ok(data),
        None => cold(|| Err(AllocError { size })),
    }
}

/// # Safety
///
/// - `data` must have come from [`malloc()`] and must not have been freed
///   already
pub unsafe fn free(data: NonNull<u8>) {
    unsafe { libc::free(data.as_ptr() as _) }
}

impl HeapAdapter for LibcHeap {
    fn allocate(&mut self, size: usize) -> Result<Handle, AllocError> {
        malloc(size).map(Handle::new)
    }

    unsafe fn release(&mut self, handle: Handle, _: usize) {
        // SAFETY:
        // - Every handle this adapter gives out is a `malloc()` pointer
        // - Caller guarantees it is still live
        unsafe { free(NonNull::new_unchecked(handle.as_ptr())) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_requests_are_unique() {
        let mut heap = LibcHeap;
        let a = heap.allocate(0).unwrap();
        let b = heap.allocate(0).unwrap();
        assert_ne!(a, b);
        unsafe {
            heap.release(a, 0);
            heap.release(b, 0);
        }
    }

    #[test]
    fn allocations_are_writable() {
        let data = malloc(32).unwrap();
        unsafe {
            data.as_ptr().write_bytes(0xab, 32);
            assert_eq!(*data.as_ptr().add(31), 0xab);
            free(data);
        }
    }
}
