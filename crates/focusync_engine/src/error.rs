//! Error types for the sync engine.

use focusync_model::{EntityKind, MappingError, OwnerId};
use focusync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// None of these ever reach the end user. The syncer logs them at the
/// operation boundary and leaves its state retry-eligible.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The credential was rejected. Treated like a sign-out.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A remote row could not be mapped to a record.
    #[error("serialization error in {kind}: {message}")]
    Serialization {
        /// Collection being decoded.
        kind: EntityKind,
        /// What went wrong.
        message: String,
    },

    /// A push was skipped because it would have wiped the remote collection.
    #[error("safety guard: {kind} for {owner} is empty locally but {known_remote} records are known remotely")]
    SafetyGuardTriggered {
        /// Collection that was not pushed.
        kind: EntityKind,
        /// Scope owner.
        owner: OwnerId,
        /// Size of the last known remote ID set.
        known_remote: usize,
    },

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Tombstone persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The syncer task has stopped.
    #[error("syncer is shut down")]
    Closed,

    /// Invalid coordinator setup.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Wraps a row mapping failure.
    pub fn from_mapping(error: MappingError) -> Self {
        let kind = match &error {
            MappingError::MissingField { kind, .. } | MappingError::InvalidField { kind, .. } => {
                *kind
            }
        };
        Self::Serialization {
            kind,
            message: error.to_string(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            _ => false,
        }
    }

    /// Returns true if the credential was rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Auth(_))
    }
}
