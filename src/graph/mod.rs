//! Everything a front-end needs to draw a ledger, short of drawing it.

pub mod layout;
pub mod snapshot;

pub use layout::{select, Layout, LayoutParams, Placement};
pub use snapshot::Snapshot;
