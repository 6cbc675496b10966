//! Error types for replaylib
//!
//! Defines the core error types used throughout the crate. Producer-path
//! failures are absorbed and logged by the rings themselves; only
//! construction and extraction surface errors to the caller.

use thiserror::Error;

/// Per-frame codec failures.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("corrupted compressed frame: {0}")]
    CorruptedBlob(String),

    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("disk tier I/O failed: {0}")]
    DiskIo(#[source] std::io::Error),

    #[error("codec failure: {0}")]
    Codec(#[from] CodecError),

    #[error("an extraction is already in flight")]
    Busy,

    #[error("extraction was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type that uses ReplayError
pub type Result<T> = std::result::Result<T, ReplayError>;
