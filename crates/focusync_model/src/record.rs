//! The `Record` trait the sync engine is generic over.

use crate::ids::{OwnerId, RecordId};
use crate::kind::EntityKind;
use std::collections::BTreeSet;
use std::fmt::Debug;

/// A domain entity that can be mirrored to the remote store.
///
/// # Invariants
///
/// - `id()` is stable for the lifetime of the record
/// - `sort_key()` defines the deterministic order used when applying a pull
/// - after `assign_owner(o)`, `owner_id()` returns `Some(o)`
pub trait Record: Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Key used to order records deterministically after a pull.
    type SortKey: Ord;

    /// The collection this record type belongs to.
    const KIND: EntityKind;

    /// Returns the record's identifier.
    fn id(&self) -> &RecordId;

    /// Returns the owning account, or `None` for guest data.
    fn owner_id(&self) -> Option<&OwnerId>;

    /// Stamps the record with an owner.
    ///
    /// Singleton records also re-key themselves to the owner here.
    fn assign_owner(&mut self, owner: &OwnerId);

    /// Returns the sort key.
    fn sort_key(&self) -> Self::SortKey;

    /// Records created for an owner whose cloud and local data are both empty.
    fn seed(_owner: &OwnerId) -> Vec<Self> {
        Vec::new()
    }
}

/// Collects the IDs of a slice of records.
pub fn id_set<R: Record>(records: &[R]) -> BTreeSet<RecordId> {
    records.iter().map(|r| r.id().clone()).collect()
}
