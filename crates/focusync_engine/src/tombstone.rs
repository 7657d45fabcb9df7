//! Pending remote deletions for one scope.

use crate::error::SyncResult;
use focusync_model::{EntityKind, OwnerId, RecordId};
use focusync_storage::{TombstoneKey, TombstoneStore};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The tombstone set of one `(entity, owner)` pair.
///
/// An in-memory cache over a [`TombstoneStore`]. Every mutation is written
/// through before the method returns.
///
/// # Invariants
///
/// - an ID leaves the set only through [`confirm`](Self::confirm), after the
///   remote store acknowledged its deletion
/// - the cache is updated even if persisting fails, so the current session
///   still flushes the ID
pub struct TombstoneSet {
    key: TombstoneKey,
    ids: BTreeSet<RecordId>,
    store: Arc<dyn TombstoneStore>,
}

impl TombstoneSet {
    /// Loads the persisted set for `kind` and `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted set cannot be read.
    pub fn load(
        store: Arc<dyn TombstoneStore>,
        kind: EntityKind,
        owner: &OwnerId,
    ) -> SyncResult<Self> {
        let key = TombstoneKey::new(kind.as_str(), owner.as_str());
        let ids = store.load(&key)?.into_iter().map(RecordId::new).collect();
        Ok(Self { key, ids, store })
    }

    /// Creates an empty set without reading the store.
    pub fn empty(store: Arc<dyn TombstoneStore>, kind: EntityKind, owner: &OwnerId) -> Self {
        Self {
            key: TombstoneKey::new(kind.as_str(), owner.as_str()),
            ids: BTreeSet::new(),
            store,
        }
    }

    /// Returns the pending IDs.
    pub fn ids(&self) -> &BTreeSet<RecordId> {
        &self.ids
    }

    /// Returns true if `id` is awaiting remote deletion.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.ids.contains(id)
    }

    /// Number of pending IDs.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Queues IDs for deletion. Returns how many were new.
    ///
    /// # Errors
    ///
    /// Returns an error if the set could not be persisted. The IDs are
    /// queued in memory regardless.
    pub fn queue(&mut self, ids: impl IntoIterator<Item = RecordId>) -> SyncResult<usize> {
        let before = self.ids.len();
        self.ids.extend(ids);
        let added = self.ids.len() - before;
        if added > 0 {
            self.persist()?;
        }
        Ok(added)
    }

    /// Removes IDs whose remote deletion succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the set could not be persisted.
    pub fn confirm(&mut self, ids: &[RecordId]) -> SyncResult<()> {
        let before = self.ids.len();
        for id in ids {
            self.ids.remove(id);
        }
        if self.ids.len() != before {
            self.persist()?;
        }
        Ok(())
    }

    /// Returns up to `size` IDs for the next delete call.
    pub fn next_batch(&self, size: usize) -> Vec<RecordId> {
        self.ids.iter().take(size.max(1)).cloned().collect()
    }

    fn persist(&self) -> SyncResult<()> {
        let raw: BTreeSet<String> = self.ids.iter().map(|id| id.as_str().to_owned()).collect();
        self.store.save(&self.key, &raw)?;
        Ok(())
    }
}

impl std::fmt::Debug for TombstoneSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TombstoneSet")
            .field("key", &self.key)
            .field("ids", &self.ids)
            .finish()
    }
}
