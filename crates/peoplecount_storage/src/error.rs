//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to truncate beyond the end of the log.
    #[error("cannot truncate to {requested} bytes, log holds only {size}")]
    TruncatePastEnd {
        /// The requested size.
        requested: u64,
        /// The current log size.
        size: u64,
    },
}
