use std::{
    alloc::{handle_alloc_error, Layout},
    slice,
};

use log::{debug, error, trace, warn};

use crate::util::hint::cold;

use super::{ledger::Ledger, Handle, HeapAdapter};

/// Capacity of the first backing buffer, doubled on every growth after that
pub const INITIAL_CAPACITY: usize = 16;

/// An unordered list of the handles some caller still considers live. This is
/// advisory: the [`Ledger`] is the authority on what is actually allocated and
/// knows nothing about trackers. Keeping the two consistent is on the caller.
#[derive(Debug, Default)]
pub struct Tracker {
    handles: Vec<Handle>,
}

impl Tracker {
    pub const fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Remember `handle`. The backing buffer doubles when full.
    ///
    /// # Panics
    ///
    /// Never, but if the buffer can't grow the process is aborted through
    /// [`handle_alloc_error()`]. Carrying on would mean silently losing track
    /// of live allocations.
    pub fn track(&mut self, handle: Handle) {
        if self.handles.len() == self.handles.capacity() {
            self.grow();
        }
        self.handles.push(handle);
        trace!("tracker: track({handle}) -> {} tracked", self.handles.len());
    }

    fn grow(&mut self) {
        let capacity = self.handles.capacity();
        let new_capacity = if capacity == 0 {
            INITIAL_CAPACITY
        } else {
            capacity.saturating_mul(2)
        };
        if self
            .handles
            .try_reserve_exact(new_capacity - self.handles.len())
            .is_err()
        {
            cold(|| {
                let layout =
                    Layout::array::<Handle>(new_capacity).unwrap_or(Layout::new::<Handle>());
                error!("tracker: could not grow to {new_capacity} handles");
                handle_alloc_error(layout)
            });
        }
        debug!("tracker: grew from {capacity} to {}", self.handles.capacity());
    }

    /// Forget one occurrence of `handle`. The last handle is moved into its
    /// place, so order is not preserved. Untracking something that was never
    /// tracked is not an error, it just returns `false`.
    pub fn untrack(&mut self, handle: Handle) -> bool {
        match self.handles.iter().position(|&h| h == handle) {
            Some(index) => {
                self.handles.swap_remove(index);
                trace!("tracker: untrack({handle}) -> {} tracked", self.handles.len());
                true
            }
            None => false,
        }
    }

    /// Remove every tracked handle from `ledger` (which releases the memory),
    /// then drop the tracker's own buffer. Returns how many removals the
    /// ledger accepted.
    pub fn reset<H>(&mut self, ledger: &mut Ledger<H>) -> usize
    where
        H: HeapAdapter,
    {
        let mut removed = 0;
        for handle in self.handles.drain(..) {
            match ledger.remove(handle) {
                Ok(_) => removed += 1,
                Err(e) => warn!("tracker: reset skipped a handle: {e}"),
            }
        }
        self.handles = Vec::new();
        removed
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.handles.contains(&handle)
    }

    pub fn iter(&self) -> slice::Iter<'_, Handle> {
        self.handles.iter()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.handles.capacity()
    }
}

impl<'a> IntoIterator for &'a Tracker {
    type Item = &'a Handle;
    type IntoIter = slice::Iter<'a, Handle>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
