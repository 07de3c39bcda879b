//! Heap adapters and the bookkeeping that sits on top of them.
//!
//! A [`HeapAdapter`] is the only thing in this crate that hands out or takes
//! back memory. The [`ledger::Ledger`] owns one and records every allocation
//! made through it, and the [`tracker::Tracker`] is a scratch list of handles
//! that a caller still considers live.

use std::{fmt, ptr::NonNull};

use crate::error::AllocError;

pub mod dlmalloc;
pub mod ledger;
pub mod manual;
pub mod tracker;

/// Opaque identity of one allocation. Handles are compared and ordered by
/// address and are never dereferenced by the ledger or the tracker.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonNull<u8>);

impl Handle {
    pub const fn new(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    /// The address as a plain integer, for ordering and display only
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    pub const fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.addr())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.addr())
    }
}

/// A thin pass-through to some underlying allocator. No bookkeeping happens
/// here, that is the ledger's job.
pub trait HeapAdapter {
    /// Request `size` bytes. A zero-sized request still returns a unique,
    /// releasable handle.
    fn allocate(&mut self, size: usize) -> Result<Handle, AllocError>;

    /// Give the memory behind `handle` back to the allocator.
    ///
    /// # Safety
    ///
    /// - `handle` must have been returned by `allocate()` on this same adapter
    ///   and must not have been released since
    /// - `size` must be the size that was passed to `allocate()`
    unsafe fn release(&mut self, handle: Handle, size: usize);
}

impl<H> HeapAdapter for Box<H>
where
    H: HeapAdapter + ?Sized,
{
    fn allocate(&mut self, size: usize) -> Result<Handle, AllocError> {
        (**self).allocate(size)
    }

    unsafe fn release(&mut self, handle: Handle, size: usize) {
        // SAFETY: identical contract, forwarded to the caller
        unsafe { (**self).release(handle, size) }
    }
}

/// Wraps another adapter and refuses any request that would take the number
/// of outstanding bytes past `budget`. Released bytes are returned to the
/// budget. A zero-sized request is charged the one byte it really occupies.
#[derive(Debug)]
pub struct BudgetHeap<H> {
    inner: H,
    budget: usize,
    in_use: usize,
}

impl<H> BudgetHeap<H>
where
    H: HeapAdapter,
{
    pub const fn new(inner: H, budget: usize) -> Self {
        Self {
            inner,
            budget,
            in_use: 0,
        }
    }

    /// How many more bytes can be handed out before requests start failing
    pub fn remaining(&self) -> usize {
        self.budget - self.in_use
    }

    pub const fn in_use(&self) -> usize {
        self.in_use
    }
}

impl<H> HeapAdapter for BudgetHeap<H>
where
    H: HeapAdapter,
{
    fn allocate(&mut self, size: usize) -> Result<Handle, AllocError> {
        let cost = size.max(1);
        if cost > self.remaining() {
            return Err(AllocError { size });
        }
        let handle = self.inner.allocate(size)?;
        self.in_use += cost;
        Ok(handle)
    }

    unsafe fn release(&mut self, handle: Handle, size: usize) {
        // SAFETY: requirement passed to caller, every handle we give out came
        //         from `inner`
        unsafe { self.inner.release(handle, size) };
        self.in_use -= size.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{manual::LibcHeap, BudgetHeap, HeapAdapter};
    use crate::error::AllocError;

    #[test]
    fn budget_heap_refuses_past_budget_and_recovers_on_release() {
        let mut heap = BudgetHeap::new(LibcHeap, 100);
        let a = heap.allocate(60).unwrap();
        assert_eq!(heap.remaining(), 40);
        assert_eq!(heap.allocate(41), Err(AllocError { size: 41 }));
        assert_eq!(heap.in_use(), 60);

        unsafe { heap.release(a, 60) };
        assert_eq!(heap.remaining(), 100);
        let b = heap.allocate(100).unwrap();
        unsafe { heap.release(b, 100) };
    }

    #[test]
    fn zero_sized_requests_cost_a_byte() {
        let mut heap = BudgetHeap::new(LibcHeap, 0);
        assert_eq!(heap.allocate(0), Err(AllocError { size: 0 }));

        let mut heap = BudgetHeap::new(LibcHeap, 2);
        let a = heap.allocate(0).unwrap();
        let b = heap.allocate(0).unwrap();
        assert_eq!(heap.in_use(), 2);
        assert_eq!(heap.allocate(0), Err(AllocError { size: 0 }));

        unsafe { heap.release(a, 0) };
        assert_eq!(heap.remaining(), 1);
        unsafe { heap.release(b, 0) };
        assert_eq!(heap.in_use(), 0);
    }

    #[test]
    fn boxed_adapters_forward() {
        let mut heap: Box<dyn HeapAdapter> = Box::new(LibcHeap);
        let handle = heap.allocate(8).unwrap();
        assert_ne!(handle.addr(), 0);
        unsafe { heap.release(handle, 8) };
    }
}
