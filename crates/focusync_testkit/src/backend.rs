//! In-memory remote backend with fault injection.
//!
//! [`MemoryBackend`] implements [`RowTransport`] over per-collection tables
//! of JSON rows. Every call is logged, faults can be scripted per
//! collection and operation, and fetches can be held at a gate to observe
//! concurrent behaviour.

use async_trait::async_trait;
use focusync_engine::{RowTransport, SyncError, SyncResult};
use focusync_model::{
    Credential, EntityKind, OwnerId, Record, RecordId, RemoteMapping, RemoteRow,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// The three remote operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// `fetch_rows`
    Fetch,
    /// `upsert_rows`
    Upsert,
    /// `delete_rows`
    Delete,
}

/// One logged call, including calls that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// A fetch for an owner.
    Fetch {
        /// Collection.
        kind: EntityKind,
        /// Requested owner.
        owner: OwnerId,
    },
    /// An upsert of the given IDs.
    Upsert {
        /// Collection.
        kind: EntityKind,
        /// Upserted IDs, in request order.
        ids: Vec<RecordId>,
    },
    /// A delete of the given IDs.
    Delete {
        /// Collection.
        kind: EntityKind,
        /// Deleted IDs, in request order.
        ids: Vec<RecordId>,
    },
}

impl RemoteCall {
    /// Collection the call targeted.
    pub fn kind(&self) -> EntityKind {
        match self {
            RemoteCall::Fetch { kind, .. }
            | RemoteCall::Upsert { kind, .. }
            | RemoteCall::Delete { kind, .. } => *kind,
        }
    }

    /// Operation of the call.
    pub fn call_kind(&self) -> CallKind {
        match self {
            RemoteCall::Fetch { .. } => CallKind::Fetch,
            RemoteCall::Upsert { .. } => CallKind::Upsert,
            RemoteCall::Delete { .. } => CallKind::Delete,
        }
    }

    /// IDs carried by an upsert or delete.
    pub fn ids(&self) -> &[RecordId] {
        match self {
            RemoteCall::Fetch { .. } => &[],
            RemoteCall::Upsert { ids, .. } | RemoteCall::Delete { ids, .. } => ids,
        }
    }
}

/// A scripted failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Retryable transport error.
    Transport,
    /// Credential rejected.
    Auth,
    /// The call never completes; the engine's request timeout fires.
    Hang,
    /// The response contains a row that fails validation.
    Malformed,
}

/// Decrements the in-flight counter even if the call is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An in-memory multi-tenant remote store.
pub struct MemoryBackend {
    tables: Mutex<BTreeMap<EntityKind, BTreeMap<String, RemoteRow>>>,
    calls: Mutex<Vec<RemoteCall>>,
    confirmed_deletes: Mutex<Vec<(EntityKind, RecordId)>>,
    faults: Mutex<HashMap<(EntityKind, CallKind), VecDeque<Fault>>>,
    fetch_gate: watch::Sender<bool>,
    fetches_in_flight: AtomicUsize,
    max_fetches_in_flight: AtomicUsize,
    latency: Mutex<Duration>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        let (fetch_gate, _rx) = watch::channel(false);
        Self {
            tables: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            confirmed_deletes: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
            fetch_gate,
            fetches_in_flight: AtomicUsize::new(0),
            max_fetches_in_flight: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    // ---- data ----

    /// Stores a record as if another device had pushed it.
    pub fn insert<R: Record + RemoteMapping>(&self, record: &R) {
        self.insert_row(R::KIND, record.to_row());
    }

    /// Stores a raw row. Rows without a string `id` are ignored.
    pub fn insert_row(&self, kind: EntityKind, row: RemoteRow) {
        if let Some(id) = row.get("id").and_then(Value::as_str).map(str::to_owned) {
            self.tables.lock().entry(kind).or_default().insert(id, row);
        }
    }

    /// Decodes every stored record of type `R`, in ID order.
    ///
    /// # Panics
    ///
    /// Panics if a stored row does not decode.
    pub fn records<R: Record + RemoteMapping>(&self) -> Vec<R> {
        self.tables
            .lock()
            .get(&R::KIND)
            .map(|table| {
                table
                    .values()
                    .map(|row| R::from_row(row).expect("stored row must decode"))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// IDs stored for `kind`.
    pub fn ids(&self, kind: EntityKind) -> BTreeSet<RecordId> {
        self.tables
            .lock()
            .get(&kind)
            .map(|table| table.keys().map(|id| RecordId::new(id.as_str())).collect())
            .unwrap_or_default()
    }

    /// A stored row.
    pub fn row(&self, kind: EntityKind, id: &str) -> Option<RemoteRow> {
        self.tables.lock().get(&kind).and_then(|t| t.get(id).cloned())
    }

    // ---- call log ----

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    /// Calls of one operation against one collection.
    pub fn calls_of(&self, kind: EntityKind, call: CallKind) -> Vec<RemoteCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.kind() == kind && c.call_kind() == call)
            .cloned()
            .collect()
    }

    /// Number of calls of one operation against one collection.
    pub fn count(&self, kind: EntityKind, call: CallKind) -> usize {
        self.calls_of(kind, call).len()
    }

    /// Forgets the call log.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
        self.confirmed_deletes.lock().clear();
    }

    /// IDs of `kind` whose delete call succeeded, one entry per success.
    pub fn confirmed_deletes(&self, kind: EntityKind) -> Vec<RecordId> {
        self.confirmed_deletes
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
            .collect()
    }

    // ---- fault injection ----

    /// Makes the next `times` calls of `call` against `kind` fail with `fault`.
    pub fn fail_next(&self, kind: EntityKind, call: CallKind, fault: Fault, times: usize) {
        self.faults
            .lock()
            .entry((kind, call))
            .or_default()
            .extend(std::iter::repeat(fault).take(times));
    }

    /// Drops all scripted faults.
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Makes every call wait `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Parks all fetches until [`release_fetches`](Self::release_fetches).
    pub fn hold_fetches(&self) {
        self.fetch_gate.send_replace(true);
    }

    /// Lets parked fetches continue.
    pub fn release_fetches(&self) {
        self.fetch_gate.send_replace(false);
    }

    /// Fetches currently running.
    pub fn fetches_in_flight(&self) -> usize {
        self.fetches_in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of fetches that ever ran at the same time.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_fetches_in_flight.load(Ordering::SeqCst)
    }

    fn next_fault(&self, kind: EntityKind, call: CallKind) -> Option<Fault> {
        self.faults
            .lock()
            .get_mut(&(kind, call))
            .and_then(VecDeque::pop_front)
    }

    async fn answer(&self, kind: EntityKind, call: CallKind) -> SyncResult<Option<Fault>> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.next_fault(kind, call) {
            None => Ok(None),
            Some(Fault::Transport) => Err(SyncError::transport_retryable(format!(
                "injected {call:?} failure for {kind}"
            ))),
            Some(Fault::Auth) => Err(SyncError::Auth("injected credential rejection".into())),
            Some(Fault::Hang) => {
                std::future::pending::<()>().await;
                Ok(None)
            }
            Some(Fault::Malformed) => Ok(Some(Fault::Malformed)),
        }
    }

    async fn wait_at_gate(&self) {
        let mut gate = self.fetch_gate.subscribe();
        loop {
            let held = *gate.borrow_and_update();
            if !held || gate.changed().await.is_err() {
                break;
            }
        }
    }
}

fn malformed_row() -> RemoteRow {
    let mut row = RemoteRow::new();
    row.insert("id".into(), Value::from(42));
    row
}

#[async_trait]
impl RowTransport for MemoryBackend {
    async fn fetch_rows(
        &self,
        kind: EntityKind,
        owner: &OwnerId,
        _credential: &Credential,
    ) -> SyncResult<Vec<RemoteRow>> {
        self.calls.lock().push(RemoteCall::Fetch {
            kind,
            owner: owner.clone(),
        });
        let now = self.fetches_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_fetches_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.fetches_in_flight);

        self.wait_at_gate().await;
        let fault = self.answer(kind, CallKind::Fetch).await?;

        let mut rows: Vec<RemoteRow> = self
            .tables
            .lock()
            .get(&kind)
            .map(|table| {
                table
                    .values()
                    .filter(|row| row.get("owner_id").and_then(Value::as_str) == Some(owner.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if fault == Some(Fault::Malformed) {
            rows.push(malformed_row());
        }
        Ok(rows)
    }

    async fn upsert_rows(
        &self,
        kind: EntityKind,
        rows: Vec<RemoteRow>,
        _credential: &Credential,
    ) -> SyncResult<Vec<RemoteRow>> {
        let ids = rows
            .iter()
            .map(|row| {
                row.get("id")
                    .and_then(Value::as_str)
                    .map(RecordId::new)
                    .ok_or_else(|| SyncError::transport_fatal("row without id"))
            })
            .collect::<SyncResult<Vec<_>>>()?;
        self.calls.lock().push(RemoteCall::Upsert {
            kind,
            ids: ids.clone(),
        });
        let fault = self.answer(kind, CallKind::Upsert).await?;

        let mut stored = Vec::with_capacity(rows.len());
        {
            let mut tables = self.tables.lock();
            let table = tables.entry(kind).or_default();
            for (id, row) in ids.iter().zip(rows) {
                let merged = table.entry(id.as_str().to_owned()).or_default();
                merged.extend(row);
                stored.push(merged.clone());
            }
        }
        if fault == Some(Fault::Malformed) {
            stored.push(malformed_row());
        }
        Ok(stored)
    }

    async fn delete_rows(
        &self,
        kind: EntityKind,
        ids: &[RecordId],
        _credential: &Credential,
    ) -> SyncResult<()> {
        self.calls.lock().push(RemoteCall::Delete {
            kind,
            ids: ids.to_vec(),
        });
        if self.answer(kind, CallKind::Delete).await? == Some(Fault::Malformed) {
            return Err(SyncError::transport_retryable("malformed delete response"));
        }

        let mut tables = self.tables.lock();
        let mut confirmed = self.confirmed_deletes.lock();
        for id in ids {
            if let Some(table) = tables.get_mut(&kind) {
                table.remove(id.as_str());
            }
            confirmed.push((kind, id.clone()));
        }
        Ok(())
    }
}
