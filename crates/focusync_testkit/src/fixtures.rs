//! Test fixtures and a fully wired sync rig.

use crate::backend::MemoryBackend;
use focusync_engine::{
    JsonRemoteStore, MemoryCollection, RetryConfig, SessionHub, SyncBinding, SyncConfig,
    SyncCoordinator, SyncerStatus,
};
use focusync_model::{EntityKind, FocusPreset, FocusSession, OwnerId, Record, UserSettings};
use focusync_storage::{FileTombstoneStore, InMemoryTombstoneStore, TombstoneStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Virtual time the rig waits for the engine to go quiet.
pub const SETTLE_TIME: Duration = Duration::from_secs(30);

/// A guest preset with a fixed ID.
pub fn preset(id: &str, name: &str, sort_order: i64) -> FocusPreset {
    FocusPreset::new(name, 25, 5)
        .with_id(id)
        .with_sort_order(sort_order)
}

/// A preset owned by `owner`.
pub fn owned_preset(id: &str, owner: &str, sort_order: i64) -> FocusPreset {
    let mut preset = preset(id, id, sort_order);
    preset.assign_owner(&OwnerId::new(owner));
    preset
}

/// A guest focus session with a fixed ID.
pub fn focus_session(id: &str, started_at_ms: i64) -> FocusSession {
    FocusSession::new(started_at_ms, 1500).with_id(id)
}

/// A focus session owned by `owner`.
pub fn owned_focus_session(id: &str, owner: &str, started_at_ms: i64) -> FocusSession {
    let mut session = focus_session(id, started_at_ms);
    session.assign_owner(&OwnerId::new(owner));
    session
}

/// Settings owned by `owner` with a custom goal.
pub fn owned_settings(owner: &str, daily_goal_minutes: u32) -> UserSettings {
    let mut settings = UserSettings::for_owner(&OwnerId::new(owner));
    settings.daily_goal_minutes = daily_goal_minutes;
    settings
}

/// Deterministic configuration for tests: short windows and no jitter.
pub fn fast_config() -> SyncConfig {
    SyncConfig::new()
        .with_debounce_window(Duration::from_millis(200))
        .with_request_timeout(Duration::from_secs(5))
        .with_retry(
            RetryConfig::new(4)
                .with_initial_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_secs(2))
                .with_jitter(false),
        )
}

/// Builder for [`TestRig`].
pub struct TestRigBuilder {
    config: SyncConfig,
    backend: Arc<MemoryBackend>,
    tombstones: Option<Arc<dyn TombstoneStore>>,
    kinds: Vec<EntityKind>,
    presets: Vec<FocusPreset>,
}

impl TestRigBuilder {
    /// Overrides the engine configuration.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing backend, e.g. to simulate a second device.
    pub fn backend(mut self, backend: Arc<MemoryBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Uses the given tombstone store instead of a fresh in-memory one.
    pub fn tombstones(mut self, store: Arc<dyn TombstoneStore>) -> Self {
        self.tombstones = Some(store);
        self
    }

    /// Binds only the listed collections.
    pub fn only(mut self, kinds: &[EntityKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    /// Initial local presets.
    pub fn presets(mut self, presets: Vec<FocusPreset>) -> Self {
        self.presets = presets;
        self
    }

    /// Wires and starts the rig. Must run inside a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if the coordinator fails to start.
    pub fn build(self) -> TestRig {
        let session = Arc::new(SessionHub::new());
        let tombstones = self
            .tombstones
            .unwrap_or_else(|| Arc::new(InMemoryTombstoneStore::new()) as Arc<dyn TombstoneStore>);
        let presets = Arc::new(MemoryCollection::new(self.presets));
        let sessions = Arc::new(MemoryCollection::<FocusSession>::empty());
        let settings = Arc::new(MemoryCollection::<UserSettings>::empty());

        let coordinator = SyncCoordinator::new(self.config, session.clone(), tombstones.clone());
        let mut bindings = Vec::new();
        for kind in &self.kinds {
            let binding = match kind {
                EntityKind::Presets => SyncBinding::<FocusPreset>::new(
                    Arc::new(JsonRemoteStore::<_, FocusPreset>::new(self.backend.clone())),
                    presets.clone(),
                )
                .boxed(),
                EntityKind::Sessions => SyncBinding::<FocusSession>::new(
                    Arc::new(JsonRemoteStore::<_, FocusSession>::new(self.backend.clone())),
                    sessions.clone(),
                )
                .boxed(),
                EntityKind::Settings => SyncBinding::<UserSettings>::new(
                    Arc::new(JsonRemoteStore::<_, UserSettings>::new(self.backend.clone())),
                    settings.clone(),
                )
                .boxed(),
            };
            bindings.push(binding);
        }
        coordinator.start(bindings).expect("coordinator must start");

        TestRig {
            backend: self.backend,
            session,
            presets,
            sessions,
            settings,
            tombstones,
            coordinator,
        }
    }
}

/// Session hub, local collections, in-memory backend and a started
/// coordinator, wired together.
pub struct TestRig {
    /// Remote side.
    pub backend: Arc<MemoryBackend>,
    /// Session source followed by the coordinator.
    pub session: Arc<SessionHub>,
    /// Local presets.
    pub presets: Arc<MemoryCollection<FocusPreset>>,
    /// Local focus sessions.
    pub sessions: Arc<MemoryCollection<FocusSession>>,
    /// Local settings.
    pub settings: Arc<MemoryCollection<UserSettings>>,
    /// Tombstone persistence.
    pub tombstones: Arc<dyn TombstoneStore>,
    /// The coordinator under test.
    pub coordinator: SyncCoordinator,
}

impl TestRig {
    /// Starts a rig builder with all collections bound.
    pub fn builder() -> TestRigBuilder {
        TestRigBuilder {
            config: fast_config(),
            backend: Arc::new(MemoryBackend::new()),
            tombstones: None,
            kinds: EntityKind::ALL.to_vec(),
            presets: Vec::new(),
        }
    }

    /// A rig with defaults.
    pub fn start() -> Self {
        Self::builder().build()
    }

    /// Signs `owner` in.
    pub fn sign_in(&self, owner: &str) {
        self.session.sign_in(owner, format!("token-{owner}"));
    }

    /// Signs out.
    pub fn sign_out(&self) {
        self.session.sign_out();
    }

    /// Lets virtual time run until pending work is done.
    pub async fn settle(&self) {
        tokio::time::sleep(SETTLE_TIME).await;
    }

    /// Current status of `kind`.
    ///
    /// # Panics
    ///
    /// Panics if `kind` is not bound.
    pub fn status(&self, kind: EntityKind) -> SyncerStatus {
        self.coordinator.status(kind).expect("entity kind must be bound")
    }

    /// Waits until the status of `kind` satisfies `predicate`.
    ///
    /// # Panics
    ///
    /// Panics if `kind` is not bound or the syncer stops first.
    pub async fn wait_for(
        &self,
        kind: EntityKind,
        mut predicate: impl FnMut(&SyncerStatus) -> bool,
    ) -> SyncerStatus {
        let mut rx = self.coordinator.subscribe(kind).expect("entity kind must be bound");
        loop {
            {
                let status = rx.borrow_and_update();
                if predicate(&status) {
                    return status.clone();
                }
            }
            rx.changed().await.expect("syncer stopped");
        }
    }

    /// Waits until `kind` has pulled for `owner`.
    pub async fn wait_synced(&self, kind: EntityKind, owner: &str) -> SyncerStatus {
        let owner = OwnerId::new(owner);
        self.wait_for(kind, |s| {
            s.pull.has_pulled_once && s.owner() == Some(&owner)
        })
        .await
    }

    /// Stops the coordinator.
    pub async fn shutdown(self) {
        self.coordinator.shutdown().await;
    }
}

/// A temporary directory holding a file tombstone store.
///
/// The directory lives as long as this value.
pub struct TempTombstones {
    _temp_dir: TempDir,
    path: std::path::PathBuf,
}

impl TempTombstones {
    /// Creates an empty temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("tombstones");
        Self {
            _temp_dir: temp_dir,
            path,
        }
    }

    /// Opens a store over the directory. Each call simulates a process restart.
    ///
    /// # Panics
    ///
    /// Panics if the store cannot be opened.
    pub fn open(&self) -> Arc<dyn TombstoneStore> {
        Arc::new(FileTombstoneStore::open(&self.path).expect("Failed to open tombstone store"))
    }
}

impl Default for TempTombstones {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `f` on a current-thread runtime with paused time.
///
/// For use inside proptest bodies, which are synchronous.
///
/// # Panics
///
/// Panics if the runtime cannot be built.
pub fn block_on_paused<F: Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .expect("Failed to build runtime")
        .block_on(f)
}
