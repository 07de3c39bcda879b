//! The ledger: an ordered record of every live allocation made through a
//! [`HeapAdapter`].
//!
//! Records are kept in insertion order as a singly linked list. The links are
//! indices into an arena rather than pointers, and slot `0` of the arena is a
//! head sentinel that never holds an allocation. Vacated slots are recycled,
//! so the arena only grows when the list is longer than it has ever been.
//!
//! ```plaintext
//!  HEAD ──> [a, 100] ──> [b, 200] ──> [c, 8] ──> none
//!                                       ^ tail
//! ```
//!
//! Appending is O(1) because the tail is tracked. Removal walks from the head
//! looking for the *predecessor* of the record to splice out, so it is O(n).
//! The workloads this is built for are small enough that this doesn't matter.
//!
//! # Ownership
//!
//! The ledger owns its heap adapter, every record, and through them every
//! recorded allocation. [`Ledger::remove()`] is the only safe way to release
//! one, and it retires the record and the memory together. Dropping the
//! ledger releases whatever is left.

use std::{fmt, iter::FusedIterator, mem};

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{AllocError, LedgerError};

use super::{manual::LibcHeap, Handle, HeapAdapter};

/// Arena index of the head sentinel
const HEAD: usize = 0;

/// What a consumer gets to see of one live allocation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    /// Where is this allocation? Only meaningful as an ordering key.
    pub address: usize,
    /// How big is it (as requested)?
    pub size: usize,
}

#[derive(Debug)]
struct Record {
    /// `None` for the head sentinel and for vacant slots
    address: Option<Handle>,
    size: usize,
    next: Option<usize>,
}

impl Record {
    const fn vacant() -> Self {
        Self {
            address: None,
            size: 0,
            next: None,
        }
    }

    fn entry(&self) -> Entry {
        let handle = self
            .address
            .expect("only the head sentinel and vacant slots have no address");
        Entry {
            address: handle.addr(),
            size: self.size,
        }
    }
}

pub struct Ledger<H = LibcHeap>
where
    H: HeapAdapter,
{
    heap: H,
    records: Vec<Record>,
    /// Vacated arena slots, reused before the arena grows
    vacant: Vec<usize>,
    tail: usize,
    len: usize,
}

impl<H> Ledger<H>
where
    H: HeapAdapter,
{
    /// An empty ledger, recording allocations made through `heap`
    pub fn new(heap: H) -> Self {
        Self {
            heap,
            records: vec![Record::vacant()],
            vacant: Vec::new(),
            tail: HEAD,
            len: 0,
        }
    }

    /// Allocate `size` bytes through the heap adapter and record the
    /// allocation. If the heap fails, nothing is recorded.
    pub fn allocate(&mut self, size: usize) -> Result<Handle, AllocError> {
        let handle = self.heap.allocate(size)?;
        // SAFETY: fresh from our own heap, so it can't already be live
        unsafe { self.append(handle, size) };
        Ok(handle)
    }

    /// Record an allocation at the tail of the ledger. From here on, the
    /// ledger owns it and will release it through its heap adapter.
    ///
    /// # Safety
    ///
    /// - `handle` must have been allocated by this ledger's heap adapter, with
    ///   `size` bytes, and must not have been released
    /// - `handle` must not already be live in this ledger
    pub unsafe fn append(&mut self, handle: Handle, size: usize) -> Entry {
        debug_assert!(
            !self.contains(handle),
            "{handle:?} appended twice, live addresses must be unique"
        );
        let record = Record {
            address: Some(handle),
            size,
            next: None,
        };
        let index = match self.vacant.pop() {
            Some(index) => {
                self.records[index] = record;
                index
            }
            None => {
                self.records.push(record);
                self.records.len() - 1
            }
        };
        self.records[self.tail].next = Some(index);
        self.tail = index;
        self.len += 1;
        trace!("ledger: append({handle}, {size}) -> {} live", self.len);
        self.records[index].entry()
    }

    /// Release the allocation behind `handle` and forget its record.
    ///
    /// Fails with [`LedgerError::UnknownHandle`] if `handle` is not live, in
    /// which case nothing changes. Releasing the same handle twice is
    /// therefore safe: the second call just reports the failure.
    pub fn remove(&mut self, handle: Handle) -> Result<Entry, LedgerError> {
        let mut prev = HEAD;
        while let Some(next) = self.records[prev].next {
            if self.records[next].address == Some(handle) {
                return Ok(self.unlink_after(prev));
            }
            prev = next;
        }
        debug!("ledger: remove({handle}) found no live allocation");
        Err(LedgerError::UnknownHandle(handle))
    }

    /// Splice out the successor of `prev` and release its allocation.
    /// `prev` must have a successor.
    fn unlink_after(&mut self, prev: usize) -> Entry {
        let index = self.records[prev]
            .next
            .expect("caller checked that `prev` has a successor");
        let record = mem::replace(&mut self.records[index], Record::vacant());
        self.records[prev].next = record.next;
        if self.tail == index {
            self.tail = prev;
        }
        self.vacant.push(index);
        self.len -= 1;

        let entry = record.entry();
        let handle = record
            .address
            .expect("only the head sentinel and vacant slots have no address");
        // SAFETY:
        // - `append()` requires the handle to come from `self.heap` with this
        //   exact size
        // - The record was the only thing that knew about the allocation and
        //   it is gone now, so this can't happen twice
        unsafe { self.heap.release(handle, record.size) };
        trace!("ledger: remove({handle}) -> {} live", self.len);
        entry
    }

    /// Release every recorded allocation, front to back. Afterwards the
    /// ledger is indistinguishable from a freshly constructed one. Returns how
    /// many allocations were released.
    pub fn clear(&mut self) -> usize {
        let mut removed = 0;
        while self.records[HEAD].next.is_some() {
            self.unlink_after(HEAD);
            removed += 1;
        }
        self.records.truncate(1);
        self.vacant.clear();
        debug_assert_eq!(self.tail, HEAD);
        debug_assert_eq!(self.len, 0);
        removed
    }

    /// Walk the live allocations in the order they were appended. This
    /// borrows the ledger, so no mutation can interleave with the walk.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            records: &self.records,
            cursor: self.records[HEAD].next,
            remaining: self.len,
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        let handle = handle.addr();
        self.entries().any(|entry| entry.address == handle)
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The oldest live allocation
    pub fn first(&self) -> Option<Entry> {
        self.records[HEAD].next.map(|index| self.records[index].entry())
    }

    /// The most recently appended live allocation (the tail)
    pub fn last(&self) -> Option<Entry> {
        (self.tail != HEAD).then(|| self.records[self.tail].entry())
    }

    /// Return the underlying heap adapter
    pub const fn heap(&self) -> &H {
        &self.heap
    }
}

impl Default for Ledger<LibcHeap> {
    fn default() -> Self {
        Self::new(LibcHeap)
    }
}

impl<H> Drop for Ledger<H>
where
    H: HeapAdapter,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<H> fmt::Debug for Ledger<H>
where
    H: HeapAdapter,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries()).finish()
    }
}

impl<'a, H> IntoIterator for &'a Ledger<H>
where
    H: HeapAdapter,
{
    type Item = Entry;
    type IntoIter = Entries<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries()
    }
}

/// Iterator over a ledger's live allocations, see [`Ledger::entries()`]
#[derive(Clone)]
pub struct Entries<'a> {
    records: &'a [Record],
    cursor: Option<usize>,
    remaining: usize,
}

impl Iterator for Entries<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        let record = &self.records[self.cursor?];
        self.cursor = record.next;
        self.remaining -= 1;
        Some(record.entry())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Entries<'_> {}

impl FusedIterator for Entries<'_> {}
