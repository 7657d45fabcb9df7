//! In-memory tombstone store for testing.

use crate::error::StorageResult;
use crate::store::{TombstoneKey, TombstoneStore};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// An in-memory tombstone store.
///
/// Suitable for unit tests, integration tests and guest-only hosts that do
/// not need deletions to survive a restart.
///
/// # Example
///
/// ```rust
/// use focusync_storage::{InMemoryTombstoneStore, TombstoneKey, TombstoneStore};
///
/// let store = InMemoryTombstoneStore::new();
/// let key = TombstoneKey::new("sessions", "bob");
/// assert!(store.load(&key).unwrap().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryTombstoneStore {
    sets: RwLock<HashMap<TombstoneKey, BTreeSet<String>>>,
    saves: RwLock<u64>,
}

impl InMemoryTombstoneStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a non-empty set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.read().len()
    }

    /// Returns true if no key holds any ID.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.read().is_empty()
    }

    /// Number of `save` calls so far.
    ///
    /// Useful for asserting that persistence happened.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        *self.saves.read()
    }
}

impl TombstoneStore for InMemoryTombstoneStore {
    fn load(&self, key: &TombstoneKey) -> StorageResult<BTreeSet<String>> {
        Ok(self.sets.read().get(key).cloned().unwrap_or_default())
    }

    fn save(&self, key: &TombstoneKey, ids: &BTreeSet<String>) -> StorageResult<()> {
        let mut sets = self.sets.write();
        if ids.is_empty() {
            sets.remove(key);
        } else {
            sets.insert(key.clone(), ids.clone());
        }
        *self.saves.write() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn memory_save_and_load() {
        let store = InMemoryTombstoneStore::new();
        let key = TombstoneKey::new("presets", "alice");

        store.save(&key, &ids(&["a", "b"])).unwrap();
        assert_eq!(store.load(&key).unwrap(), ids(&["a", "b"]));
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn memory_keys_are_independent() {
        let store = InMemoryTombstoneStore::new();
        let alice = TombstoneKey::new("presets", "alice");
        let bob = TombstoneKey::new("presets", "bob");
        let alice_sessions = TombstoneKey::new("sessions", "alice");

        store.save(&alice, &ids(&["a"])).unwrap();
        store.save(&bob, &ids(&["b"])).unwrap();

        assert_eq!(store.load(&alice).unwrap(), ids(&["a"]));
        assert_eq!(store.load(&bob).unwrap(), ids(&["b"]));
        assert!(store.load(&alice_sessions).unwrap().is_empty());
    }

    #[test]
    fn memory_empty_save_removes_entry() {
        let store = InMemoryTombstoneStore::new();
        let key = TombstoneKey::new("presets", "alice");

        store.save(&key, &ids(&["a"])).unwrap();
        assert_eq!(store.len(), 1);

        store.save(&key, &BTreeSet::new()).unwrap();
        assert!(store.is_empty());
        assert!(store.load(&key).unwrap().is_empty());
    }
}
