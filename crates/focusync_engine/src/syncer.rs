//! The per-entity reconciliation actor.
//!
//! Each [`EntitySyncer`] runs as one tokio task that owns all of its state.
//! Commands (session transitions, local change notifications, refresh and
//! completions of remote calls) arrive on a single channel and are handled
//! strictly one at a time. Remote calls run in spawned tasks and report back
//! through the same channel, tagged with the scope generation they were
//! started under.

use crate::config::{RetryConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::local::LocalCollection;
use crate::remote::RemoteStore;
use crate::scheduler::{Backoff, CoalescingScheduler};
use crate::state::{Operation, PullState, SyncPhase, SyncScope, SyncStats, SyncerStatus};
use crate::tombstone::TombstoneSet;
use focusync_model::{id_set, Credential, EntityKind, OwnerId, Record, RecordId, SessionState};
use focusync_storage::TombstoneStore;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

enum Command<R> {
    Session(SessionState),
    LocalChanged(Vec<R>),
    Refresh,
    ForcePush,
    Reset,
    Shutdown,
    Completed(Completion<R>),
}

struct Completion<R> {
    generation: u64,
    outcome: Outcome<R>,
}

enum Outcome<R> {
    Pull(SyncResult<Vec<R>>),
    Push {
        upserted: BTreeSet<RecordId>,
        result: SyncResult<usize>,
    },
    Flush {
        ids: Vec<RecordId>,
        result: SyncResult<()>,
    },
}

enum Wake<R> {
    Command(Option<Command<R>>),
    Tick,
}

/// What the actor does with the scope after an event.
enum Verdict {
    Keep,
    Drop(&'static str),
}

/// Suppression of the notifications caused by the syncer's own writes.
///
/// Each write arms one snapshot. Notifications coalesce, so a notification
/// matching a snapshot consumes it together with every older one.
struct EchoGuard<R> {
    pending: Vec<Vec<R>>,
}

impl<R: PartialEq> EchoGuard<R> {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    fn arm(&mut self, snapshot: Vec<R>) {
        self.pending.push(snapshot);
    }

    /// Returns true if `contents` is exactly what the syncer wrote, i.e. the
    /// notification is an echo. Anything else disarms the guard.
    fn consume(&mut self, contents: &[R]) -> bool {
        match self.pending.iter().position(|snapshot| snapshot.as_slice() == contents) {
            Some(at) => {
                self.pending.drain(..=at);
                true
            }
            None => {
                self.pending.clear();
                false
            }
        }
    }

    fn is_armed(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Collaborators and settings shared by every scope of one syncer.
struct SyncerContext<R: Record> {
    kind: EntityKind,
    config: SyncConfig,
    remote: Arc<dyn RemoteStore<R>>,
    local: Arc<dyn LocalCollection<R>>,
    tombstones: Arc<dyn TombstoneStore>,
    commands: mpsc::WeakUnboundedSender<Command<R>>,
}

impl<R: Record> SyncerContext<R> {
    fn spawn_op<F>(&self, generation: u64, op: F)
    where
        F: Future<Output = Outcome<R>> + Send + 'static,
    {
        let Some(tx) = self.commands.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let outcome = op.await;
            let _ = tx.send(Command::Completed(Completion {
                generation,
                outcome,
            }));
        });
    }
}

async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = SyncResult<T>>,
) -> SyncResult<T> {
    time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| Err(SyncError::Timeout))
}

/// All state that lives exactly as long as one sign-in.
struct ActiveScope<R> {
    scope: SyncScope,
    credential: Credential,
    pull: PullState,
    pull_wanted: bool,
    pull_retry: Backoff,
    echo: EchoGuard<R>,
    last_known_remote: BTreeSet<RecordId>,
    tombstones: TombstoneSet,
    flush_retry: Backoff,
    push_debounce: CoalescingScheduler,
    push_ready: bool,
    push_retry: Backoff,
    force_next_push: bool,
    in_flight: Option<Operation>,
}

impl<R: Record> ActiveScope<R> {
    fn new(
        scope: SyncScope,
        credential: Credential,
        tombstones: TombstoneSet,
        config: &SyncConfig,
    ) -> Self {
        Self {
            scope,
            credential,
            pull: PullState::default(),
            pull_wanted: true,
            pull_retry: Backoff::default(),
            echo: EchoGuard::new(),
            last_known_remote: BTreeSet::new(),
            tombstones,
            flush_retry: Backoff::default(),
            push_debounce: CoalescingScheduler::new(config.debounce_window, config.debounce_max_wait),
            push_ready: false,
            push_retry: Backoff::default(),
            force_next_push: false,
            in_flight: None,
        }
    }

    fn phase(&self) -> SyncPhase {
        if self.pull.has_pulled_once {
            SyncPhase::Synced
        } else {
            SyncPhase::Bootstrapping
        }
    }

    /// Asks for a pull unless one is already running.
    fn request_pull(&mut self) {
        if !self.pull.in_flight {
            self.pull_wanted = true;
            self.pull_retry.reset();
        }
    }

    /// External triggers retry whatever is still outstanding.
    fn retrigger(&mut self) {
        if !self.pull.has_pulled_once {
            self.request_pull();
        }
        self.flush_retry.reset();
    }

    fn next_deadline(&self, now: Instant) -> Option<Instant> {
        let mut deadlines = Vec::with_capacity(3);
        deadlines.extend(self.push_debounce.deadline());
        if self.pull_wanted {
            deadlines.extend(self.pull_retry.retry_at().filter(|at| *at > now));
        }
        if !self.tombstones.is_empty() {
            deadlines.extend(self.flush_retry.retry_at().filter(|at| *at > now));
        }
        deadlines.into_iter().min()
    }

    fn start_pull(&mut self, ctx: &SyncerContext<R>) {
        self.pull_wanted = false;
        self.pull.in_flight = true;
        self.in_flight = Some(Operation::Pull);

        let remote = Arc::clone(&ctx.remote);
        let owner = self.scope.owner.clone();
        let credential = self.credential.clone();
        let timeout = ctx.config.request_timeout;
        debug!(
            entity = %ctx.kind,
            owner = %owner,
            generation = self.scope.generation,
            op = "pull",
            "starting remote call"
        );
        ctx.spawn_op(self.scope.generation, async move {
            Outcome::Pull(bounded(timeout, remote.fetch(&owner, &credential)).await)
        });
    }

    fn start_flush(&mut self, ctx: &SyncerContext<R>) {
        let ids = self.tombstones.next_batch(ctx.config.delete_batch_size);
        self.in_flight = Some(Operation::Flush);

        let remote = Arc::clone(&ctx.remote);
        let credential = self.credential.clone();
        let timeout = ctx.config.request_timeout;
        debug!(
            entity = %ctx.kind,
            owner = %self.scope.owner,
            generation = self.scope.generation,
            op = "flush",
            count = ids.len(),
            "starting remote call"
        );
        ctx.spawn_op(self.scope.generation, async move {
            let result = bounded(timeout, remote.delete(&ids, &credential)).await;
            Outcome::Flush { ids, result }
        });
    }

    fn start_push(&mut self, ctx: &SyncerContext<R>, stats: &mut SyncStats) {
        let forced = std::mem::take(&mut self.force_next_push);
        self.push_ready = false;
        let kind = ctx.kind;
        let owner = self.scope.owner.clone();

        let mut records = Vec::new();
        let mut foreign = 0usize;
        let mut adopted = 0usize;
        let current = ctx.local.current_value();
        for mut record in current.iter().cloned() {
            match record.owner_id() {
                Some(other) if *other != owner => {
                    foreign += 1;
                    continue;
                }
                Some(_) => {}
                None => {
                    record.assign_owner(&owner);
                    adopted += 1;
                }
            }
            records.push(record);
        }
        if adopted > 0 {
            // Guest records belong to this owner from now on, locally too.
            let stamped = adopt_guest_records(current, &owner);
            info!(entity = %kind, owner = %owner, adopted, "guest records adopted");
            self.echo.arm(stamped.clone());
            ctx.local.replace_all(stamped);
        }
        if foreign > 0 {
            stats.foreign_records_skipped += foreign as u64;
            warn!(
                entity = %kind,
                owner = %owner,
                skipped = foreign,
                "local records owned by another account were not pushed"
            );
        }
        if kind.is_singleton() {
            records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            records.truncate(1);
        }

        if records.is_empty() && !self.last_known_remote.is_empty() && !forced {
            let guard = SyncError::SafetyGuardTriggered {
                kind,
                owner,
                known_remote: self.last_known_remote.len(),
            };
            stats.safety_guard_trips += 1;
            warn!(entity = %kind, error = %guard, "near miss: push skipped");
            return;
        }

        let current = id_set(&records);
        if !kind.is_singleton() {
            let deleted: Vec<RecordId> = self
                .last_known_remote
                .difference(&current)
                .cloned()
                .collect();
            if !deleted.is_empty() {
                match self.tombstones.queue(deleted) {
                    Ok(added) => debug!(entity = %kind, owner = %owner, queued = added, "deletions queued"),
                    Err(e) => {
                        stats.storage_errors += 1;
                        stats.last_error = Some(e.to_string());
                        error!(entity = %kind, owner = %owner, error = %e, "failed to persist tombstones");
                    }
                }
                self.flush_retry.reset();
            }
        }

        let upsert: Vec<R> = records
            .into_iter()
            .filter(|r| !self.tombstones.contains(r.id()))
            .collect();
        if upsert.len() < current.len() {
            debug!(
                entity = %kind,
                held_back = current.len() - upsert.len(),
                "records awaiting remote deletion held back"
            );
        }

        let upserted = id_set(&upsert);
        if upsert.is_empty() {
            debug!(entity = %kind, owner = %owner, forced, "nothing to upsert");
            self.last_known_remote = upserted;
            self.push_retry.reset();
            return;
        }

        self.in_flight = Some(Operation::Push);
        let remote = Arc::clone(&ctx.remote);
        let credential = self.credential.clone();
        let timeout = ctx.config.request_timeout;
        let batch_size = ctx.config.upsert_batch_size.max(1);
        debug!(
            entity = %kind,
            owner = %owner,
            generation = self.scope.generation,
            op = "push",
            count = upsert.len(),
            forced,
            "starting remote call"
        );
        ctx.spawn_op(self.scope.generation, async move {
            let mut stored = 0;
            for batch in upsert.chunks(batch_size) {
                match bounded(timeout, remote.upsert(batch, &credential)).await {
                    Ok(rows) => stored += rows.len(),
                    Err(e) => {
                        return Outcome::Push {
                            upserted,
                            result: Err(e),
                        }
                    }
                }
            }
            Outcome::Push {
                upserted,
                result: Ok(stored),
            }
        });
    }

    fn on_pull_done(
        &mut self,
        ctx: &SyncerContext<R>,
        stats: &mut SyncStats,
        result: SyncResult<Vec<R>>,
        now: Instant,
    ) -> Verdict {
        self.pull.in_flight = false;
        let kind = ctx.kind;
        let owner = self.scope.owner.clone();

        let fetched = match result {
            Ok(fetched) => fetched,
            Err(e) if e.is_auth() => {
                warn!(entity = %kind, owner = %owner, op = "pull", error = %e, "credential rejected");
                stats.pulls_failed += 1;
                stats.last_error = Some(e.to_string());
                return Verdict::Drop("credential rejected");
            }
            Err(e) => {
                stats.pulls_failed += 1;
                stats.last_error = Some(e.to_string());
                let retry = if e.is_retryable() {
                    self.pull_retry.record_failure(&ctx.config.retry, now)
                } else {
                    None
                };
                match retry {
                    Some(delay) => {
                        self.pull_wanted = true;
                        warn!(entity = %kind, owner = %owner, op = "pull", error = %e, retry_in = ?delay, "pull failed");
                    }
                    None => {
                        warn!(entity = %kind, owner = %owner, op = "pull", error = %e, "pull failed, waiting for next trigger");
                    }
                }
                return Verdict::Keep;
            }
        };

        self.pull_retry.reset();
        if self.pull.has_pulled_once && (self.push_ready || self.push_debounce.is_pending()) {
            // Local edits are waiting to be pushed; they go out before the
            // baseline is replaced.
            self.push_debounce.cancel();
            self.push_ready = true;
            self.pull_wanted = true;
            stats.pulls_deferred += 1;
            debug!(entity = %kind, owner = %owner, "pull result dropped, pending push goes first");
            return Verdict::Keep;
        }
        let total = fetched.len();
        let mut mine: Vec<R> = fetched
            .into_iter()
            .filter(|r| r.owner_id().map_or(true, |o| *o == owner))
            .collect();
        if mine.len() < total {
            warn!(
                entity = %kind,
                owner = %owner,
                dropped = total - mine.len(),
                "remote returned records of another owner"
            );
        }

        if mine.is_empty() {
            // No cloud data yet: this owner's local records (or a seed)
            // become the baseline.
            let local = ctx.local.current_value();
            let mut baseline: Vec<R> = local
                .iter()
                .filter(|r| r.owner_id().map_or(true, |o| *o == owner))
                .cloned()
                .collect();
            let foreign = local.len() - baseline.len();
            if foreign > 0 {
                stats.foreign_records_skipped += foreign as u64;
                warn!(
                    entity = %kind,
                    owner = %owner,
                    dropped = foreign,
                    "local records of another account removed"
                );
            }
            if baseline.is_empty() {
                baseline = R::seed(&owner);
                if !baseline.is_empty() {
                    info!(entity = %kind, owner = %owner, count = baseline.len(), "seeding empty collection");
                }
            }
            let baseline = adopt_guest_records(baseline, &owner);
            if baseline != local {
                self.echo.arm(baseline.clone());
                ctx.local.replace_all(baseline);
            }
            self.last_known_remote.clear();
            self.push_ready = true;
        } else {
            let remote_ids = id_set(&mine);
            mine.retain(|r| !self.tombstones.contains(r.id()));
            mine.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            if kind.is_singleton() {
                mine.truncate(1);
            }
            stats.records_pulled += mine.len() as u64;

            self.echo.arm(mine.clone());
            ctx.local.replace_all(mine);
            self.last_known_remote = remote_ids;
        }

        self.pull.has_pulled_once = true;
        stats.pulls_succeeded += 1;
        info!(
            entity = %kind,
            owner = %owner,
            generation = self.scope.generation,
            remote = self.last_known_remote.len(),
            pending_deletes = self.tombstones.len(),
            "pull applied"
        );
        Verdict::Keep
    }

    fn on_push_done(
        &mut self,
        ctx: &SyncerContext<R>,
        stats: &mut SyncStats,
        upserted: BTreeSet<RecordId>,
        result: SyncResult<usize>,
        now: Instant,
    ) -> Verdict {
        let kind = ctx.kind;
        match result {
            Ok(stored) => {
                stats.pushes_succeeded += 1;
                stats.records_pushed += upserted.len() as u64;
                self.push_retry.reset();
                debug!(entity = %kind, owner = %self.scope.owner, upserted = upserted.len(), stored, "push succeeded");
                self.last_known_remote = upserted;
                Verdict::Keep
            }
            Err(e) if e.is_auth() => {
                stats.pushes_failed += 1;
                stats.last_error = Some(e.to_string());
                warn!(entity = %kind, owner = %self.scope.owner, op = "push", error = %e, "credential rejected");
                Verdict::Drop("credential rejected")
            }
            Err(e) => {
                stats.pushes_failed += 1;
                stats.last_error = Some(e.to_string());
                let retry = if e.is_retryable() {
                    self.push_retry.record_failure(&ctx.config.retry, now)
                } else {
                    None
                };
                match retry {
                    Some(delay) => {
                        self.push_debounce.schedule_at(now + delay);
                        warn!(entity = %kind, owner = %self.scope.owner, op = "push", error = %e, retry_in = ?delay, "push failed");
                    }
                    None => {
                        warn!(entity = %kind, owner = %self.scope.owner, op = "push", error = %e, "push failed, waiting for next change");
                    }
                }
                Verdict::Keep
            }
        }
    }

    fn on_flush_done(
        &mut self,
        ctx: &SyncerContext<R>,
        stats: &mut SyncStats,
        ids: Vec<RecordId>,
        result: SyncResult<()>,
        now: Instant,
    ) -> Verdict {
        let kind = ctx.kind;
        match result {
            Ok(()) => {
                stats.deletes_confirmed += ids.len() as u64;
                self.flush_retry.reset();
                if let Err(e) = self.tombstones.confirm(&ids) {
                    stats.storage_errors += 1;
                    stats.last_error = Some(e.to_string());
                    error!(entity = %kind, owner = %self.scope.owner, error = %e, "failed to persist tombstones");
                }
                for id in &ids {
                    self.last_known_remote.remove(id);
                }
                debug!(entity = %kind, owner = %self.scope.owner, deleted = ids.len(), remaining = self.tombstones.len(), "deletes confirmed");

                let local = id_set(&ctx.local.current_value());
                if self.pull.has_pulled_once && ids.iter().any(|id| local.contains(id)) {
                    debug!(entity = %kind, "re-pushing records recreated while their delete was pending");
                    self.push_ready = true;
                }
                Verdict::Keep
            }
            Err(e) if e.is_auth() => {
                stats.deletes_failed += 1;
                stats.last_error = Some(e.to_string());
                warn!(entity = %kind, owner = %self.scope.owner, op = "flush", error = %e, "credential rejected");
                Verdict::Drop("credential rejected")
            }
            Err(e) => {
                stats.deletes_failed += 1;
                stats.last_error = Some(e.to_string());
                let retry = if e.is_retryable() {
                    self.flush_retry.record_failure(&ctx.config.retry, now)
                } else {
                    self.flush_retry.record_failure(&RetryConfig::disabled(), now)
                };
                warn!(
                    entity = %kind,
                    owner = %self.scope.owner,
                    op = "flush",
                    error = %e,
                    pending = self.tombstones.len(),
                    retry_in = ?retry,
                    "delete failed, ids stay queued"
                );
                Verdict::Keep
            }
        }
    }
}

/// Stamps every ownerless record with `owner`.
fn adopt_guest_records<R: Record>(records: Vec<R>, owner: &OwnerId) -> Vec<R> {
    records
        .into_iter()
        .map(|mut record| {
            if record.owner_id().is_none() {
                record.assign_owner(owner);
            }
            record
        })
        .collect()
}

enum SyncerState<R> {
    Idle,
    Active(Box<ActiveScope<R>>),
}

/// The reconciliation state machine for one entity collection.
///
/// Construct it with [`EntitySyncer::spawn`], which starts the actor task
/// and returns a [`SyncerHandle`] for sending it events.
///
/// # Phases
///
/// - `Idle`: no scope; local changes are ignored and nothing touches the network
/// - `Bootstrapping`: a scope is active and the first pull has not succeeded yet
/// - `Synced`: local changes are debounced and pushed; tombstones are flushed
pub struct EntitySyncer<R: Record> {
    ctx: SyncerContext<R>,
    state: SyncerState<R>,
    generation: u64,
    stats: SyncStats,
    status_tx: watch::Sender<SyncerStatus>,
}

impl<R: Record> EntitySyncer<R> {
    /// Spawns a syncer task on the current tokio runtime.
    ///
    /// The task runs until [`SyncerHandle::shutdown`] is called or every
    /// handle has been dropped.
    pub fn spawn(
        config: SyncConfig,
        remote: Arc<dyn RemoteStore<R>>,
        local: Arc<dyn LocalCollection<R>>,
        tombstones: Arc<dyn TombstoneStore>,
    ) -> (SyncerHandle<R>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SyncerStatus::idle(R::KIND));
        let syncer = Self {
            ctx: SyncerContext {
                kind: R::KIND,
                config,
                remote,
                local,
                tombstones,
                commands: tx.downgrade(),
            },
            state: SyncerState::Idle,
            generation: 0,
            stats: SyncStats::default(),
            status_tx,
        };
        let task = tokio::spawn(syncer.run(rx));
        let handle = SyncerHandle {
            kind: R::KIND,
            tx,
            status: status_rx,
        };
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command<R>>) {
        debug!(entity = %self.ctx.kind, "syncer started");
        loop {
            let wake = match self.next_deadline() {
                Some(deadline) => tokio::select! {
                    command = rx.recv() => Wake::Command(command),
                    () = time::sleep_until(deadline) => Wake::Tick,
                },
                None => Wake::Command(rx.recv().await),
            };

            match wake {
                Wake::Tick => self.on_tick(),
                Wake::Command(None) | Wake::Command(Some(Command::Shutdown)) => break,
                Wake::Command(Some(command)) => self.handle(command),
            }
            self.drive();
            self.publish();
        }
        self.end_scope("shutdown");
        self.publish();
        debug!(entity = %self.ctx.kind, "syncer stopped");
    }

    fn next_deadline(&self) -> Option<Instant> {
        match &self.state {
            SyncerState::Active(active) => active.next_deadline(Instant::now()),
            SyncerState::Idle => None,
        }
    }

    fn handle(&mut self, command: Command<R>) {
        match command {
            Command::Session(session) => self.on_session(session),
            Command::LocalChanged(records) => self.on_local_changed(records),
            Command::Refresh => self.on_refresh(),
            Command::ForcePush => self.on_force_push(),
            Command::Reset => self.end_scope("reset"),
            Command::Completed(completion) => self.on_completed(completion),
            Command::Shutdown => {}
        }
    }

    fn on_tick(&mut self) {
        if let SyncerState::Active(active) = &mut self.state {
            if active.push_debounce.take_due(Instant::now()) {
                active.push_ready = true;
            }
        }
    }

    fn on_session(&mut self, session: SessionState) {
        let kind = self.ctx.kind;
        match session {
            SessionState::Authenticated { owner, credential } => {
                if let SyncerState::Active(active) = &mut self.state {
                    if active.scope.owner == owner {
                        active.credential = credential;
                        active.retrigger();
                        debug!(entity = %kind, owner = %owner, "session re-announced");
                        return;
                    }
                    info!(entity = %kind, from = %active.scope.owner, to = %owner, "owner changed");
                    self.end_scope("owner changed");
                }
                self.begin_scope(owner, credential);
            }
            SessionState::Guest { reason } => {
                debug!(entity = %kind, reason = %reason, "guest mode");
                self.end_scope("guest");
            }
            SessionState::SignedOut => self.end_scope("signed out"),
        }
    }

    fn begin_scope(&mut self, owner: OwnerId, credential: Credential) {
        let kind = self.ctx.kind;
        self.generation += 1;
        let tombstones = match TombstoneSet::load(Arc::clone(&self.ctx.tombstones), kind, &owner) {
            Ok(set) => set,
            Err(e) => {
                self.stats.storage_errors += 1;
                self.stats.last_error = Some(e.to_string());
                error!(entity = %kind, owner = %owner, error = %e, "failed to load tombstones");
                TombstoneSet::empty(Arc::clone(&self.ctx.tombstones), kind, &owner)
            }
        };
        info!(
            entity = %kind,
            owner = %owner,
            generation = self.generation,
            pending_deletes = tombstones.len(),
            "scope started"
        );
        self.stats.scopes_started += 1;
        let scope = SyncScope {
            owner,
            generation: self.generation,
        };
        self.state = SyncerState::Active(Box::new(ActiveScope::new(
            scope,
            credential,
            tombstones,
            &self.ctx.config,
        )));
    }

    fn end_scope(&mut self, reason: &str) {
        if let SyncerState::Active(active) = std::mem::replace(&mut self.state, SyncerState::Idle) {
            info!(
                entity = %self.ctx.kind,
                owner = %active.scope.owner,
                generation = active.scope.generation,
                reason,
                "scope ended"
            );
        }
    }

    fn on_local_changed(&mut self, records: Vec<R>) {
        let kind = self.ctx.kind;
        let SyncerState::Active(active) = &mut self.state else {
            return;
        };
        if active.echo.consume(&records) {
            self.stats.echoes_suppressed += 1;
            debug!(entity = %kind, "pull echo suppressed");
            return;
        }
        if !active.pull.has_pulled_once {
            active.request_pull();
            return;
        }
        active.flush_retry.reset();
        let now = Instant::now();
        let due_in = active.push_debounce.request(now).saturating_duration_since(now);
        debug!(entity = %kind, due_in = ?due_in, "push scheduled");
    }

    fn on_refresh(&mut self) {
        if let SyncerState::Active(active) = &mut self.state {
            debug!(entity = %self.ctx.kind, owner = %active.scope.owner, "refresh requested");
            if active.pull.has_pulled_once && active.push_debounce.is_pending() {
                active.push_debounce.cancel();
                active.push_ready = true;
            }
            active.request_pull();
            active.flush_retry.reset();
        }
    }

    fn on_force_push(&mut self) {
        let kind = self.ctx.kind;
        match &mut self.state {
            SyncerState::Active(active) if active.pull.has_pulled_once => {
                info!(entity = %kind, owner = %active.scope.owner, "force push requested");
                active.force_next_push = true;
                active.push_ready = true;
                active.push_debounce.cancel();
                active.push_retry.reset();
            }
            SyncerState::Active(active) => {
                debug!(entity = %kind, "force push ignored before first pull");
                active.request_pull();
            }
            SyncerState::Idle => debug!(entity = %kind, "force push ignored while idle"),
        }
    }

    fn on_completed(&mut self, completion: Completion<R>) {
        let now = Instant::now();
        let active = match &mut self.state {
            SyncerState::Active(active) if active.scope.generation == completion.generation => active,
            _ => {
                self.stats.stale_completions += 1;
                debug!(entity = %self.ctx.kind, generation = completion.generation, "stale completion discarded");
                return;
            }
        };

        active.in_flight = None;
        let verdict = match completion.outcome {
            Outcome::Pull(result) => active.on_pull_done(&self.ctx, &mut self.stats, result, now),
            Outcome::Push { upserted, result } => {
                active.on_push_done(&self.ctx, &mut self.stats, upserted, result, now)
            }
            Outcome::Flush { ids, result } => {
                active.on_flush_done(&self.ctx, &mut self.stats, ids, result, now)
            }
        };
        if let Verdict::Drop(reason) = verdict {
            self.end_scope(reason);
        }
    }

    /// Starts the next remote call if the slot is free.
    ///
    /// Priority is pull, then tombstone flush, then push. A push that is
    /// already due runs before a re-pull so the pull cannot overwrite it.
    fn drive(&mut self) {
        let now = Instant::now();
        let SyncerState::Active(active) = &mut self.state else {
            return;
        };
        while active.in_flight.is_none() {
            let push_due = active.push_ready && active.pull.has_pulled_once;
            if active.pull_wanted && !push_due && active.pull_retry.is_ready(now) {
                active.start_pull(&self.ctx);
            } else if !active.tombstones.is_empty() && active.flush_retry.is_ready(now) {
                active.start_flush(&self.ctx);
            } else if push_due {
                // May finish without a call, e.g. after queueing deletions.
                active.start_push(&self.ctx, &mut self.stats);
            } else {
                break;
            }
        }
    }

    fn publish(&self) {
        let kind = self.ctx.kind;
        let status = match &self.state {
            SyncerState::Idle => SyncerStatus {
                stats: self.stats.clone(),
                ..SyncerStatus::idle(kind)
            },
            SyncerState::Active(active) => SyncerStatus {
                kind,
                phase: active.phase(),
                scope: Some(active.scope.clone()),
                pull: active.pull,
                last_known_remote: active.last_known_remote.clone(),
                pending_tombstones: active.tombstones.ids().clone(),
                echo_armed: active.echo.is_armed(),
                push_pending: active.push_ready || active.push_debounce.is_pending(),
                in_flight: active.in_flight,
                stats: self.stats.clone(),
                updated_at: Instant::now(),
            },
        };
        self.status_tx.send_replace(status);
    }
}

/// Sends events to a running [`EntitySyncer`] and observes its status.
pub struct SyncerHandle<R: Record> {
    kind: EntityKind,
    tx: mpsc::UnboundedSender<Command<R>>,
    status: watch::Receiver<SyncerStatus>,
}

impl<R: Record> Clone for SyncerHandle<R> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            tx: self.tx.clone(),
            status: self.status.clone(),
        }
    }
}

impl<R: Record> SyncerHandle<R> {
    fn send(&self, command: Command<R>) -> SyncResult<()> {
        self.tx.send(command).map_err(|_| SyncError::Closed)
    }

    /// The entity collection this syncer owns.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Forwards a session transition.
    pub fn apply_session(&self, session: SessionState) -> SyncResult<()> {
        self.send(Command::Session(session))
    }

    /// Notifies the syncer that the local collection now holds `records`.
    pub fn local_changed(&self, records: Vec<R>) -> SyncResult<()> {
        self.send(Command::LocalChanged(records))
    }

    /// Re-pulls the baseline.
    pub fn refresh(&self) -> SyncResult<()> {
        self.send(Command::Refresh)
    }

    /// Pushes immediately, bypassing the safety guard once.
    pub fn force_push(&self) -> SyncResult<()> {
        self.send(Command::ForcePush)
    }

    /// Drops the active scope and all in-memory sync state.
    pub fn reset(&self) -> SyncResult<()> {
        self.send(Command::Reset)
    }

    /// Stops the syncer task.
    pub fn shutdown(&self) -> SyncResult<()> {
        self.send(Command::Shutdown)
    }

    /// Returns true once the syncer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Latest published status.
    pub fn status(&self) -> SyncerStatus {
        self.status.borrow().clone()
    }

    /// Returns a receiver of status snapshots.
    pub fn subscribe(&self) -> watch::Receiver<SyncerStatus> {
        self.status.clone()
    }

    /// Waits until a published status satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] if the syncer stops first.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SyncerStatus) -> bool,
    ) -> SyncResult<SyncerStatus> {
        let mut rx = self.status.clone();
        loop {
            {
                let status = rx.borrow_and_update();
                if predicate(&status) {
                    return Ok(status.clone());
                }
            }
            rx.changed().await.map_err(|_| SyncError::Closed)?;
        }
    }
}

/// Forwards every change of `local` to the syncer, skipping the value
/// present at subscription time.
pub(crate) fn spawn_local_forwarder<R: Record>(
    handle: SyncerHandle<R>,
    local: &dyn LocalCollection<R>,
) -> JoinHandle<()> {
    let mut rx = local.subscribe();
    rx.borrow_and_update();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let records = rx.borrow_and_update().clone();
            if handle.local_changed(records).is_err() {
                break;
            }
        }
    })
}
