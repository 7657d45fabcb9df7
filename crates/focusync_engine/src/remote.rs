//! Remote store abstraction.
//!
//! Two layers are provided:
//! - [`RemoteStore`], the typed per-record interface the syncers talk to
//! - [`RowTransport`], a raw seam that moves untyped JSON rows
//!
//! [`JsonRemoteStore`] bridges the two through the record's
//! [`RemoteMapping`] implementation.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use focusync_model::{Credential, EntityKind, OwnerId, Record, RecordId, RemoteMapping, RemoteRow};
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed access to one remote collection.
///
/// # Contract
///
/// - `fetch` returns only records owned by `owner`
/// - `upsert` is an idempotent insert-or-merge by primary key
/// - `delete` of an ID that does not exist is not an error
#[async_trait]
pub trait RemoteStore<R: Record>: Send + Sync {
    /// Fetches every record of `owner`.
    async fn fetch(&self, owner: &OwnerId, credential: &Credential) -> SyncResult<Vec<R>>;

    /// Inserts or merges `records`, returning what the store now holds.
    async fn upsert(&self, records: &[R], credential: &Credential) -> SyncResult<Vec<R>>;

    /// Deletes `ids`.
    async fn delete(&self, ids: &[RecordId], credential: &Credential) -> SyncResult<()>;
}

/// Raw row transport, shared by every collection.
///
/// Implementations map HTTP status codes or driver errors onto
/// [`SyncError::Transport`] and [`SyncError::Auth`].
#[async_trait]
pub trait RowTransport: Send + Sync {
    /// Fetches all rows of `kind` owned by `owner`.
    async fn fetch_rows(
        &self,
        kind: EntityKind,
        owner: &OwnerId,
        credential: &Credential,
    ) -> SyncResult<Vec<RemoteRow>>;

    /// Upserts rows of `kind` keyed by their `id` column.
    async fn upsert_rows(
        &self,
        kind: EntityKind,
        rows: Vec<RemoteRow>,
        credential: &Credential,
    ) -> SyncResult<Vec<RemoteRow>>;

    /// Deletes rows of `kind` by ID.
    async fn delete_rows(
        &self,
        kind: EntityKind,
        ids: &[RecordId],
        credential: &Credential,
    ) -> SyncResult<()>;
}

/// A [`RemoteStore`] over a [`RowTransport`].
///
/// Every row coming back from the transport is decoded and validated; one
/// malformed row fails the whole call with [`SyncError::Serialization`].
pub struct JsonRemoteStore<T, R> {
    transport: Arc<T>,
    _record: PhantomData<fn() -> R>,
}

impl<T: RowTransport, R: Record + RemoteMapping> JsonRemoteStore<T, R> {
    /// Creates a store for records of type `R`.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            _record: PhantomData,
        }
    }

    fn decode(rows: &[RemoteRow]) -> SyncResult<Vec<R>> {
        rows.iter()
            .map(|row| R::from_row(row).map_err(SyncError::from_mapping))
            .collect()
    }
}

#[async_trait]
impl<T, R> RemoteStore<R> for JsonRemoteStore<T, R>
where
    T: RowTransport + 'static,
    R: Record + RemoteMapping,
{
    async fn fetch(&self, owner: &OwnerId, credential: &Credential) -> SyncResult<Vec<R>> {
        let rows = self.transport.fetch_rows(R::KIND, owner, credential).await?;
        Self::decode(&rows)
    }

    async fn upsert(&self, records: &[R], credential: &Credential) -> SyncResult<Vec<R>> {
        let rows = records.iter().map(RemoteMapping::to_row).collect();
        let stored = self.transport.upsert_rows(R::KIND, rows, credential).await?;
        Self::decode(&stored)
    }

    async fn delete(&self, ids: &[RecordId], credential: &Credential) -> SyncResult<()> {
        self.transport.delete_rows(R::KIND, ids, credential).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focusync_model::FocusPreset;
    use parking_lot::Mutex;
    use serde_json::Value;

    #[derive(Default)]
    struct EchoTransport {
        fetched: Mutex<Vec<RemoteRow>>,
        deleted: Mutex<Vec<(EntityKind, Vec<RecordId>)>>,
    }

    #[async_trait]
    impl RowTransport for EchoTransport {
        async fn fetch_rows(
            &self,
            _kind: EntityKind,
            _owner: &OwnerId,
            _credential: &Credential,
        ) -> SyncResult<Vec<RemoteRow>> {
            Ok(self.fetched.lock().clone())
        }

        async fn upsert_rows(
            &self,
            _kind: EntityKind,
            rows: Vec<RemoteRow>,
            _credential: &Credential,
        ) -> SyncResult<Vec<RemoteRow>> {
            Ok(rows)
        }

        async fn delete_rows(
            &self,
            kind: EntityKind,
            ids: &[RecordId],
            _credential: &Credential,
        ) -> SyncResult<()> {
            self.deleted.lock().push((kind, ids.to_vec()));
            Ok(())
        }
    }

    fn store(transport: &Arc<EchoTransport>) -> JsonRemoteStore<EchoTransport, FocusPreset> {
        JsonRemoteStore::new(Arc::clone(transport))
    }

    #[tokio::test]
    async fn upsert_maps_rows_both_ways() {
        let transport = Arc::new(EchoTransport::default());
        let preset = FocusPreset::new("Classic", 25, 5).with_id("p1");

        let stored = store(&transport)
            .upsert(&[preset.clone()], &Credential::new("t"))
            .await
            .unwrap();
        assert_eq!(stored, vec![preset]);
    }

    #[tokio::test]
    async fn malformed_row_fails_whole_fetch() {
        let transport = Arc::new(EchoTransport::default());
        let good = FocusPreset::new("Classic", 25, 5).with_id("p1").to_row();
        let mut bad = good.clone();
        bad.insert("focus_minutes".into(), Value::String("soon".into()));
        transport.fetched.lock().extend([good, bad]);

        let err = store(&transport)
            .fetch(&OwnerId::new("alice"), &Credential::new("t"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Serialization {
                kind: EntityKind::Presets,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn delete_passes_kind_through() {
        let transport = Arc::new(EchoTransport::default());
        store(&transport)
            .delete(&[RecordId::new("p1")], &Credential::new("t"))
            .await
            .unwrap();
        assert_eq!(
            transport.deleted.lock().as_slice(),
            &[(EntityKind::Presets, vec![RecordId::new("p1")])]
        );
    }
}
