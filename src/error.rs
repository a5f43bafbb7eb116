//! Error types for the delta document engine.

use crate::types::PageId;
use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the storage engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error from the source file or the page swap files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Position or range lies outside the document
    #[error("Range {position}+{length} is out of bounds for document of size {size}")]
    OutOfBounds { position: u64, length: u64, size: u64 },

    /// Page id is not currently allocated in the page store
    #[error("Invalid page id {0}")]
    InvalidPageId(PageId),

    /// Data corruption detected (e.g., checksum mismatch)
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Operation not provided by this data source variant
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Invalid operation for the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration rejected during validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StorageError {
    /// Create an out-of-bounds error for the given range
    pub fn out_of_bounds(position: u64, length: u64, size: u64) -> Self {
        Self::OutOfBounds {
            position,
            length,
            size,
        }
    }

    /// Create a corruption error with a message
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
