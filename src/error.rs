// src/error.rs

use std::io;

/// Errors surfaced by the ring transport and the dispatch layer.
///
/// OS primitives report `io::Error` directly; everything above them funnels
/// into this enum.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid ring capacity {0}: must be at least 1")]
    InvalidCapacity(usize),

    #[error("invalid slab shard count {0}: must be a non-zero power of two")]
    InvalidShardCount(usize),

    #[error("no handler registered for call id {0}")]
    UnknownCall(u32),

    #[error("peer or worker pool disconnected")]
    Disconnected,

    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
