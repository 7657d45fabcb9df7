//! Tombstone store trait definition.

use crate::error::StorageResult;
use std::collections::BTreeSet;
use std::fmt;

/// Identifies one persisted tombstone set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TombstoneKey {
    /// Collection name (for example `presets`).
    pub collection: String,
    /// Owning account.
    pub owner: String,
}

impl TombstoneKey {
    /// Creates a key.
    pub fn new(collection: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            owner: owner.into(),
        }
    }
}

impl fmt::Display for TombstoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.owner)
    }
}

/// Durable storage for record IDs whose remote deletion is still pending.
///
/// # Invariants
///
/// - `load` of a never-saved key returns an empty set
/// - after `save(k, s)` returns `Ok`, `load(k)` returns `s`, also after a
///   process restart for durable implementations
/// - keys are independent: saving one never changes another
///
/// # Implementors
///
/// - [`super::InMemoryTombstoneStore`] - For testing
/// - [`super::FileTombstoneStore`] - For persistent storage
pub trait TombstoneStore: Send + Sync {
    /// Loads the ID set for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored data cannot be read or parsed.
    fn load(&self, key: &TombstoneKey) -> StorageResult<BTreeSet<String>>;

    /// Replaces the ID set for `key`. Saving an empty set removes the entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be written durably.
    fn save(&self, key: &TombstoneKey, ids: &BTreeSet<String>) -> StorageResult<()>;
}
