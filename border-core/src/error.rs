//! Errors in the library.
use thiserror::Error;

/// Errors raised when accessing values in a [`Record`](crate::record::Record).
#[derive(Error, Debug)]
pub enum LrrError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}

/// Errors raised by the multi-step replay buffer.
#[derive(Error, Debug, PartialEq)]
pub enum ReplayBufferError {
    /// Sampling was requested from a buffer holding no records.
    #[error("cannot sample from an empty replay buffer")]
    Empty,

    /// A caller-supplied index is not a valid record position.
    #[error("index {index} is out of range for a buffer of size {size}")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// The number of valid records.
        size: usize,
    },

    /// The buffer configuration cannot be used.
    #[error("invalid replay buffer configuration: {0}")]
    InvalidConfig(String),
}
