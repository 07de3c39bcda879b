//! An allocation ledger for heap visualisation.
//!
//! Every allocation made through a [`Ledger`] is recorded, in order, on the
//! side. A front-end can walk the live allocations once per frame and lay
//! them out with [`graph::Layout`], without ever looking inside the
//! allocator. [`Workload`] generates reproducible allocate/release traffic to
//! fill a ledger with something worth looking at.
//!
//! Nothing here is thread safe. A host that shares a ledger between threads
//! has to put the ledger and its tracker behind one lock together.

pub mod alloc;
pub mod error;
pub mod graph;
pub mod util;
pub mod workload;

pub use crate::alloc::{ledger::Ledger, tracker::Tracker, Handle, HeapAdapter};
pub use crate::workload::{RunReport, Workload, WorkloadConfig};
