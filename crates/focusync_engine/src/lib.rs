//! # focusync Sync Engine
//!
//! Local↔remote reconciliation for the focusync collections.
//!
//! This crate provides:
//! - [`EntitySyncer`], one actor per entity collection
//! - [`SyncCoordinator`], which owns the syncers and follows the session
//! - Trailing-edge push debouncing with an optional max-wait cap
//! - Persisted tombstones for deletions that have not reached the remote yet
//! - Retry with exponential backoff and per-call timeouts
//! - The [`RemoteStore`], [`LocalCollection`] and [`SessionProvider`] seams
//!
//! ## Architecture
//!
//! Every syncer follows a **pull-once-then-push** model per sign-in:
//! 1. On an authenticated session, pull the owner's remote collection and
//!    replace the local contents with it (or push local data if the remote
//!    is empty)
//! 2. Debounce local changes and upsert the full local contents
//! 3. Queue IDs that disappeared locally as tombstones and delete them
//!    remotely until the delete is confirmed
//!
//! ## Key Invariants
//!
//! - No remote call runs for an owner other than the active scope's
//! - At most one remote call per syncer is in flight
//! - A pull-apply is never echoed back as a push
//! - An empty local collection never wipes a non-empty remote one unless
//!   the caller forces it
//! - A tombstone is dropped only after the remote confirmed the delete
//!
//! Semantics are coarse whole-collection last-writer-wins; there is no
//! field-level conflict resolution.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod error;
mod local;
mod remote;
mod scheduler;
mod session;
mod state;
mod syncer;
mod tombstone;

pub use config::{RetryConfig, SyncConfig};
pub use coordinator::{EntityBinding, SpawnedSyncer, SyncBinding, SyncCoordinator, SyncerControl};
pub use error::{SyncError, SyncResult};
pub use local::{LocalCollection, MemoryCollection};
pub use remote::{JsonRemoteStore, RemoteStore, RowTransport};
pub use scheduler::{Backoff, CoalescingScheduler};
pub use session::{SessionHub, SessionProvider};
pub use state::{Operation, PullState, SyncPhase, SyncScope, SyncStats, SyncerStatus};
pub use syncer::{EntitySyncer, SyncerHandle};
pub use tombstone::TombstoneSet;
