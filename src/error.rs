use std::io;

use thiserror::Error;

use crate::alloc::Handle;

/// The underlying allocator could not satisfy a request. Never fatal: the
/// caller skips whatever it was going to do with the allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("allocator could not satisfy a request for {size} bytes")]
pub struct AllocError {
    pub size: usize,
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The handle is not currently live in the ledger. This is what a second
    /// release of the same handle looks like.
    #[error("{0:?} is not a live allocation")]
    UnknownHandle(Handle),
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("could not access snapshot file: {0}")]
    Io(#[from] io::Error),
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] io::Error),
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
