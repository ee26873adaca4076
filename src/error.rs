//! Error types for the storage engine.

use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the storage engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error from the underlying file system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialized data does not match its expected format
    /// (magic mismatch, bad checksum, inconsistent header parameters)
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A page or record was configured with impossible values
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A derivation attempted to change an immutable field
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Adding an element beyond a node or page capacity
    #[error("Overflow: {0}")]
    Overflow(String),

    /// Index-based access outside container bounds
    #[error("Out of range: {len} bytes at index {index} exceed {capacity} bytes")]
    OutOfRange {
        index: usize,
        len: usize,
        capacity: usize,
    },

    /// Data too large for the surrounding container
    #[error("Length error: {0}")]
    Length(String),
}

impl StorageError {
    /// Create an invalid format error with a message
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an invalid transition error
    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    /// Create an overflow error
    pub fn overflow(msg: impl Into<String>) -> Self {
        Self::Overflow(msg.into())
    }

    /// Create a length error
    pub fn length(msg: impl Into<String>) -> Self {
        Self::Length(msg.into())
    }

    /// Create an out-of-range error for an access of `len` bytes at `index`
    pub fn out_of_range(index: usize, len: usize, capacity: usize) -> Self {
        Self::OutOfRange {
            index,
            len,
            capacity,
        }
    }
}
