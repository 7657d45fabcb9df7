//! Observable syncer state.

use focusync_model::{EntityKind, OwnerId, RecordId};
use std::collections::BTreeSet;
use tokio::time::Instant;

/// The lifecycle phase of an entity syncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No active scope. No network calls are made.
    Idle,
    /// A scope is active but no pull has succeeded yet.
    Bootstrapping,
    /// A baseline has been pulled at least once for the active scope.
    Synced,
}

impl SyncPhase {
    /// Returns true if a scope is active.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncPhase::Idle)
    }

    /// Returns true if local changes are pushed in this phase.
    pub fn can_push(&self) -> bool {
        matches!(self, SyncPhase::Synced)
    }
}

/// Whose data is being synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncScope {
    /// Owner of the scope.
    pub owner: OwnerId,
    /// Generation the scope was created in. Completions of remote calls
    /// started under another generation are discarded.
    pub generation: u64,
}

/// Per-scope pull bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullState {
    /// A pull has succeeded in this scope.
    pub has_pulled_once: bool,
    /// A pull is running.
    pub in_flight: bool,
}

/// The remote operation a syncer is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Fetching the baseline.
    Pull,
    /// Upserting local contents.
    Push,
    /// Deleting tombstoned IDs.
    Flush,
}

impl Operation {
    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Pull => "pull",
            Operation::Push => "push",
            Operation::Flush => "flush",
        }
    }
}

/// Counters accumulated over the lifetime of a syncer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Scopes started.
    pub scopes_started: u64,
    /// Successful pulls.
    pub pulls_succeeded: u64,
    /// Failed pulls.
    pub pulls_failed: u64,
    /// Pull results discarded because local edits were still waiting to be
    /// pushed. The pull is repeated after the push.
    pub pulls_deferred: u64,
    /// Records applied locally by pulls.
    pub records_pulled: u64,
    /// Successful pushes.
    pub pushes_succeeded: u64,
    /// Failed pushes.
    pub pushes_failed: u64,
    /// Records upserted by successful pushes.
    pub records_pushed: u64,
    /// Local records skipped because another owner holds them.
    pub foreign_records_skipped: u64,
    /// IDs whose remote deletion was confirmed.
    pub deletes_confirmed: u64,
    /// Failed delete calls.
    pub deletes_failed: u64,
    /// Local notifications swallowed by the echo guard.
    pub echoes_suppressed: u64,
    /// Pushes skipped by the safety guard.
    pub safety_guard_trips: u64,
    /// Completions discarded because their scope ended.
    pub stale_completions: u64,
    /// Tombstone persistence failures.
    pub storage_errors: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// A snapshot of one syncer, published after every state change.
#[derive(Debug, Clone)]
pub struct SyncerStatus {
    /// Entity collection.
    pub kind: EntityKind,
    /// Lifecycle phase.
    pub phase: SyncPhase,
    /// Active scope, if any.
    pub scope: Option<SyncScope>,
    /// Pull bookkeeping of the active scope.
    pub pull: PullState,
    /// IDs the remote store is believed to hold.
    pub last_known_remote: BTreeSet<RecordId>,
    /// IDs awaiting remote deletion.
    pub pending_tombstones: BTreeSet<RecordId>,
    /// The echo guard is armed.
    pub echo_armed: bool,
    /// A push is scheduled or ready to run.
    pub push_pending: bool,
    /// The operation currently in flight.
    pub in_flight: Option<Operation>,
    /// Lifetime counters.
    pub stats: SyncStats,
    /// When this snapshot was taken.
    pub updated_at: Instant,
}

impl SyncerStatus {
    /// An idle status with no history.
    pub fn idle(kind: EntityKind) -> Self {
        Self {
            kind,
            phase: SyncPhase::Idle,
            scope: None,
            pull: PullState::default(),
            last_known_remote: BTreeSet::new(),
            pending_tombstones: BTreeSet::new(),
            echo_armed: false,
            push_pending: false,
            in_flight: None,
            stats: SyncStats::default(),
            updated_at: Instant::now(),
        }
    }

    /// Owner of the active scope.
    pub fn owner(&self) -> Option<&OwnerId> {
        self.scope.as_ref().map(|s| &s.owner)
    }

    /// Returns true if nothing is scheduled, running or waiting for deletion.
    pub fn is_quiescent(&self) -> bool {
        self.in_flight.is_none() && !self.push_pending && self.pending_tombstones.is_empty()
    }
}
