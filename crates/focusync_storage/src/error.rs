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

    /// A stored document could not be parsed.
    #[error("malformed tombstone document: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored document parsed but does not belong where it was found.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}
