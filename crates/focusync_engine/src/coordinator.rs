//! Ownership and lifecycle of all entity syncers.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::local::LocalCollection;
use crate::remote::RemoteStore;
use crate::session::SessionProvider;
use crate::state::SyncerStatus;
use crate::syncer::{spawn_local_forwarder, EntitySyncer, SyncerHandle};
use focusync_model::{EntityKind, Record, SessionState};
use focusync_storage::TombstoneStore;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Type-erased control surface of one running syncer.
pub trait SyncerControl: Send + Sync {
    /// The entity collection the syncer owns.
    fn kind(&self) -> EntityKind;

    /// Forwards a session transition.
    fn apply_session(&self, session: SessionState) -> SyncResult<()>;

    /// Re-pulls the baseline.
    fn refresh(&self) -> SyncResult<()>;

    /// Pushes immediately, bypassing the safety guard once.
    fn force_push(&self) -> SyncResult<()>;

    /// Drops the active scope and all in-memory sync state.
    fn reset(&self) -> SyncResult<()>;

    /// Stops the syncer task.
    fn shutdown(&self) -> SyncResult<()>;

    /// Latest published status.
    fn status(&self) -> SyncerStatus;

    /// Returns a receiver of status snapshots.
    fn subscribe(&self) -> watch::Receiver<SyncerStatus>;
}

impl<R: Record> SyncerControl for SyncerHandle<R> {
    fn kind(&self) -> EntityKind {
        SyncerHandle::kind(self)
    }

    fn apply_session(&self, session: SessionState) -> SyncResult<()> {
        SyncerHandle::apply_session(self, session)
    }

    fn refresh(&self) -> SyncResult<()> {
        SyncerHandle::refresh(self)
    }

    fn force_push(&self) -> SyncResult<()> {
        SyncerHandle::force_push(self)
    }

    fn reset(&self) -> SyncResult<()> {
        SyncerHandle::reset(self)
    }

    fn shutdown(&self) -> SyncResult<()> {
        SyncerHandle::shutdown(self)
    }

    fn status(&self) -> SyncerStatus {
        SyncerHandle::status(self)
    }

    fn subscribe(&self) -> watch::Receiver<SyncerStatus> {
        SyncerHandle::subscribe(self)
    }
}

/// A running syncer plus the tasks that feed it.
pub struct SpawnedSyncer {
    /// Control surface.
    pub control: Arc<dyn SyncerControl>,
    /// The actor task.
    pub task: JoinHandle<()>,
    /// Tasks forwarding local changes.
    pub forwarders: Vec<JoinHandle<()>>,
}

/// Something the coordinator can turn into a running syncer.
pub trait EntityBinding: Send {
    /// The entity collection this binding wires up.
    fn kind(&self) -> EntityKind;

    /// Spawns the syncer and its local change forwarder.
    fn spawn(
        self: Box<Self>,
        config: SyncConfig,
        tombstones: Arc<dyn TombstoneStore>,
    ) -> SpawnedSyncer;
}

/// Binds one record type's remote store to its local collection.
pub struct SyncBinding<R: Record> {
    remote: Arc<dyn RemoteStore<R>>,
    local: Arc<dyn LocalCollection<R>>,
}

impl<R: Record> SyncBinding<R> {
    /// Creates a binding.
    pub fn new(remote: Arc<dyn RemoteStore<R>>, local: Arc<dyn LocalCollection<R>>) -> Self {
        Self { remote, local }
    }

    /// Boxes the binding for [`SyncCoordinator::start`].
    pub fn boxed(self) -> Box<dyn EntityBinding> {
        Box::new(self)
    }
}

impl<R: Record> EntityBinding for SyncBinding<R> {
    fn kind(&self) -> EntityKind {
        R::KIND
    }

    fn spawn(
        self: Box<Self>,
        config: SyncConfig,
        tombstones: Arc<dyn TombstoneStore>,
    ) -> SpawnedSyncer {
        let SyncBinding { remote, local } = *self;
        let (handle, task) = EntitySyncer::spawn(config, remote, Arc::clone(&local), tombstones);
        let forwarder = spawn_local_forwarder(handle.clone(), local.as_ref());
        SpawnedSyncer {
            control: Arc::new(handle),
            task,
            forwarders: vec![forwarder],
        }
    }
}

#[derive(Default)]
struct Running {
    started: bool,
    syncers: BTreeMap<EntityKind, Arc<dyn SyncerControl>>,
    syncer_tasks: Vec<JoinHandle<()>>,
    feeder_tasks: Vec<JoinHandle<()>>,
}

/// Owns the entity syncers and routes session transitions to all of them.
///
/// # Example
///
/// ```rust,ignore
/// let coordinator = SyncCoordinator::new(SyncConfig::default(), session, tombstones);
/// coordinator.start(vec![
///     SyncBinding::new(presets_remote, presets_local).boxed(),
///     SyncBinding::new(settings_remote, settings_local).boxed(),
/// ])?;
/// ```
pub struct SyncCoordinator {
    config: SyncConfig,
    session: Arc<dyn SessionProvider>,
    tombstones: Arc<dyn TombstoneStore>,
    running: Mutex<Running>,
}

impl SyncCoordinator {
    /// Creates a coordinator. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: SyncConfig,
        session: Arc<dyn SessionProvider>,
        tombstones: Arc<dyn TombstoneStore>,
    ) -> Self {
        Self {
            config,
            session,
            tombstones,
            running: Mutex::new(Running::default()),
        }
    }

    /// Spawns one syncer per binding and starts following the session.
    ///
    /// Must be called from within a tokio runtime. Returns `Ok(false)` if the
    /// coordinator was already started; the bindings are dropped unused.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if two bindings share an entity kind.
    pub fn start(&self, bindings: Vec<Box<dyn EntityBinding>>) -> SyncResult<bool> {
        let mut running = self.running.lock();
        if running.started {
            debug!("coordinator already started");
            return Ok(false);
        }

        let mut seen = BTreeSet::new();
        for binding in &bindings {
            if !seen.insert(binding.kind()) {
                return Err(SyncError::Config(format!(
                    "entity kind {} is bound twice",
                    binding.kind()
                )));
            }
        }

        for binding in bindings {
            let kind = binding.kind();
            let spawned = binding.spawn(self.config.clone(), Arc::clone(&self.tombstones));
            running.syncers.insert(kind, spawned.control);
            running.syncer_tasks.push(spawned.task);
            running.feeder_tasks.extend(spawned.forwarders);
        }

        let controls: Vec<Arc<dyn SyncerControl>> = running.syncers.values().cloned().collect();
        let mut sessions = self.session.subscribe();
        running.feeder_tasks.push(tokio::spawn(async move {
            let initial = sessions.borrow_and_update().clone();
            fan_out(&controls, &initial);
            while sessions.changed().await.is_ok() {
                let session = sessions.borrow_and_update().clone();
                fan_out(&controls, &session);
            }
        }));

        running.started = true;
        let entities: Vec<&str> = running.syncers.keys().map(EntityKind::as_str).collect();
        info!(entities = ?entities, "sync coordinator started");
        Ok(true)
    }

    /// Returns true once [`start`](Self::start) has succeeded.
    pub fn is_started(&self) -> bool {
        self.running.lock().started
    }

    fn controls(&self) -> Vec<Arc<dyn SyncerControl>> {
        self.running.lock().syncers.values().cloned().collect()
    }

    fn control(&self, kind: EntityKind) -> SyncResult<Arc<dyn SyncerControl>> {
        self.running
            .lock()
            .syncers
            .get(&kind)
            .cloned()
            .ok_or_else(|| SyncError::Config(format!("no syncer for {kind}")))
    }

    /// Forwards one session transition to every syncer.
    pub fn apply_session(&self, session: &SessionState) {
        fan_out(&self.controls(), session);
    }

    /// Moves every syncer to idle and clears its in-memory state.
    ///
    /// Persisted tombstones are kept. The next authenticated session event
    /// bootstraps again.
    pub fn disable_and_reset_all(&self) {
        info!("disabling sync for all entities");
        for control in self.controls() {
            if let Err(e) = control.reset() {
                warn!(entity = %control.kind(), error = %e, "reset not delivered");
            }
        }
    }

    /// Re-pulls every collection.
    pub fn refresh_all(&self) {
        for control in self.controls() {
            if let Err(e) = control.refresh() {
                warn!(entity = %control.kind(), error = %e, "refresh not delivered");
            }
        }
    }

    /// Pushes `kind` immediately, bypassing the safety guard once.
    ///
    /// Use after the user deliberately deleted everything.
    ///
    /// # Errors
    ///
    /// Returns an error if no syncer handles `kind` or it has stopped.
    pub fn force_push(&self, kind: EntityKind) -> SyncResult<()> {
        self.control(kind)?.force_push()
    }

    /// Status of the syncer for `kind`.
    pub fn status(&self, kind: EntityKind) -> Option<SyncerStatus> {
        self.running
            .lock()
            .syncers
            .get(&kind)
            .map(|control| control.status())
    }

    /// Status of every syncer, ordered by entity kind.
    pub fn statuses(&self) -> Vec<SyncerStatus> {
        self.controls().iter().map(|c| c.status()).collect()
    }

    /// Subscribes to status snapshots of `kind`.
    pub fn subscribe(&self, kind: EntityKind) -> Option<watch::Receiver<SyncerStatus>> {
        self.running
            .lock()
            .syncers
            .get(&kind)
            .map(|control| control.subscribe())
    }

    /// Stops every task and waits for the syncers to exit.
    pub async fn shutdown(&self) {
        let (syncers, syncer_tasks, feeder_tasks) = {
            let mut running = self.running.lock();
            (
                std::mem::take(&mut running.syncers),
                std::mem::take(&mut running.syncer_tasks),
                std::mem::take(&mut running.feeder_tasks),
            )
        };

        for task in &feeder_tasks {
            task.abort();
        }
        for control in syncers.values() {
            let _ = control.shutdown();
        }
        for task in syncer_tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "syncer task ended abnormally");
            }
        }
        info!("sync coordinator stopped");
    }
}

fn fan_out(controls: &[Arc<dyn SyncerControl>], session: &SessionState) {
    debug!(session = session.label(), syncers = controls.len(), "session transition");
    for control in controls {
        if let Err(e) = control.apply_session(session.clone()) {
            warn!(entity = %control.kind(), error = %e, "session not delivered");
        }
    }
}
