//! End-to-end tests: coordinator, syncers, JSON row mapping and tombstone
//! persistence against the in-memory backend.

use focusync_engine::{SyncPhase, SyncerStatus};
use focusync_model::{
    EntityKind, FocusPreset, OwnerId, Record, RecordId, UserSettings,
};
use focusync_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::time::Duration;

const PRESETS: EntityKind = EntityKind::Presets;

fn presets_rig() -> TestRigBuilder {
    init_tracing();
    TestRig::builder().only(&[PRESETS])
}

fn ids(list: &[&str]) -> BTreeSet<RecordId> {
    list.iter().map(|id| RecordId::new(*id)).collect()
}

fn local_ids(rig: &TestRig) -> BTreeSet<RecordId> {
    use focusync_engine::LocalCollection;
    rig.presets.current_value().iter().map(|p| p.id().clone()).collect()
}

fn upserted_ids(rig: &TestRig) -> Vec<Vec<RecordId>> {
    rig.backend
        .calls_of(PRESETS, CallKind::Upsert)
        .iter()
        .map(|c| c.ids().to_vec())
        .collect()
}

// ============================================================================
// Pull
// ============================================================================

#[tokio::test(start_paused = true)]
async fn repeated_sign_in_events_issue_one_pull() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.backend.hold_fetches();

    rig.sign_in("alice");
    rig.wait_for(PRESETS, |s| s.pull.in_flight).await;
    for _ in 0..5 {
        rig.sign_in("alice");
        rig.coordinator.refresh_all();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    rig.backend.release_fetches();
    rig.wait_synced(PRESETS, "alice").await;
    rig.settle().await;

    assert_eq!(rig.backend.count(PRESETS, CallKind::Fetch), 1);
    assert_eq!(rig.backend.max_concurrent_fetches(), 1);
    assert_eq!(local_ids(&rig), ids(&["a"]));
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn applying_a_pull_is_not_echoed_back() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.backend.insert(&owned_preset("b", "alice", 1));

    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;
    rig.settle().await;

    let status = rig.status(PRESETS);
    assert_eq!(rig.backend.count(PRESETS, CallKind::Upsert), 0);
    assert_eq!(status.stats.echoes_suppressed, 1);
    assert!(!status.echo_armed);
    assert_eq!(status.last_known_remote, ids(&["a", "b"]));
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transient_pull_failures_are_retried_with_backoff() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.backend.fail_next(PRESETS, CallKind::Fetch, Fault::Transport, 2);

    rig.sign_in("alice");
    rig.settle().await;

    let status = rig.status(PRESETS);
    assert_eq!(status.phase, SyncPhase::Synced);
    assert_eq!(status.stats.pulls_failed, 2);
    assert_eq!(status.stats.pulls_succeeded, 1);
    assert_eq!(rig.backend.count(PRESETS, CallKind::Fetch), 3);
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn hung_pull_times_out_and_retries() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.backend.fail_next(PRESETS, CallKind::Fetch, Fault::Hang, 1);

    rig.sign_in("alice");
    rig.settle().await;

    let status = rig.status(PRESETS);
    assert_eq!(status.phase, SyncPhase::Synced);
    assert_eq!(status.stats.pulls_failed, 1);
    assert_eq!(rig.backend.fetches_in_flight(), 0);
    assert_eq!(local_ids(&rig), ids(&["a"]));
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_rows_fail_the_pull_until_the_next_trigger() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.backend.fail_next(PRESETS, CallKind::Fetch, Fault::Malformed, 1);

    rig.sign_in("alice");
    rig.settle().await;

    let status = rig.status(PRESETS);
    assert_eq!(status.phase, SyncPhase::Bootstrapping);
    assert_eq!(rig.backend.count(PRESETS, CallKind::Fetch), 1);
    assert!(rig.presets.is_empty());

    rig.coordinator.refresh_all();
    rig.wait_synced(PRESETS, "alice").await;
    assert_eq!(local_ids(&rig), ids(&["a"]));
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rejected_credential_drops_the_scope() {
    let rig = presets_rig().build();
    rig.backend.fail_next(PRESETS, CallKind::Fetch, Fault::Auth, 1);

    rig.sign_in("alice");
    let status = rig
        .wait_for(PRESETS, |s| s.stats.pulls_failed == 1 && s.scope.is_none())
        .await;
    assert_eq!(status.phase, SyncPhase::Idle);
    rig.settle().await;
    assert_eq!(rig.backend.count(PRESETS, CallKind::Fetch), 1);

    // A fresh session event bootstraps again.
    rig.sign_in("alice");
    let status = rig.wait_synced(PRESETS, "alice").await;
    assert_eq!(status.stats.scopes_started, 2);
    rig.shutdown().await;
}

// ============================================================================
// Bootstrap from an empty remote
// ============================================================================

#[tokio::test(start_paused = true)]
async fn guest_data_is_adopted_when_the_remote_is_empty() {
    let rig = presets_rig().presets(vec![preset("x", "Guest", 0)]).build();

    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;
    rig.settle().await;

    let remote = rig.backend.records::<FocusPreset>();
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].id, RecordId::new("x"));
    assert_eq!(remote[0].owner_id, Some(OwnerId::new("alice")));
    assert_eq!(rig.status(PRESETS).last_known_remote, ids(&["x"]));

    use focusync_engine::LocalCollection;
    let local = rig.presets.current_value();
    assert_eq!(local, remote);
    assert_eq!(rig.backend.count(PRESETS, CallKind::Upsert), 1);
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn adopted_guest_records_stay_with_their_first_owner() {
    let rig = presets_rig().presets(vec![preset("g", "Guest", 0)]).build();

    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;
    rig.settle().await;
    rig.sign_out();
    rig.wait_for(PRESETS, |s| s.phase == SyncPhase::Idle).await;
    rig.backend.clear_calls();

    // Bob has no cloud data either.
    rig.sign_in("bob");
    rig.wait_synced(PRESETS, "bob").await;
    rig.settle().await;

    for batch in upserted_ids(&rig) {
        assert!(!batch.contains(&RecordId::new("g")));
    }
    let stored = rig.backend.records::<FocusPreset>();
    let guest = stored.iter().find(|p| p.id == RecordId::new("g")).unwrap();
    assert_eq!(guest.owner_id, Some(OwnerId::new("alice")));
    assert!(!local_ids(&rig).contains(&RecordId::new("g")));
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn records_created_while_signed_in_are_stamped_locally() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;
    rig.settle().await;

    rig.presets.push(preset("n", "New", 1));
    rig.settle().await;

    use focusync_engine::LocalCollection;
    let local = rig.presets.current_value();
    assert!(local.iter().all(|p| p.owner_id == Some(OwnerId::new("alice"))));
    assert_eq!(rig.backend.count(PRESETS, CallKind::Upsert), 1);
    let status = rig.status(PRESETS);
    assert!(!status.echo_armed);
    assert!(status.is_quiescent());
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn empty_account_is_seeded_once() {
    let rig = presets_rig().build();

    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;
    rig.settle().await;

    let seeded = rig.backend.records::<FocusPreset>();
    assert_eq!(seeded.len(), 3);
    assert!(seeded.iter().all(|p| p.owner_id == Some(OwnerId::new("alice"))));
    assert_eq!(rig.presets.len(), 3);
    assert_eq!(rig.backend.count(PRESETS, CallKind::Upsert), 1);
    rig.shutdown().await;
}

// ============================================================================
// Push and delete
// ============================================================================

#[tokio::test(start_paused = true)]
async fn bursts_of_edits_are_pushed_once() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;

    for i in 1..=5 {
        rig.presets.push(preset(&format!("p{i}"), "New", i));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    rig.settle().await;

    let upserts = upserted_ids(&rig);
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].len(), 6);
    assert_eq!(rig.backend.ids(PRESETS).len(), 6);
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn deleting_one_of_two_records_deletes_exactly_that_record() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.backend.insert(&owned_preset("b", "alice", 1));
    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;

    assert!(rig.presets.remove(&RecordId::new("a")));
    rig.settle().await;

    let deletes = rig.backend.calls_of(PRESETS, CallKind::Delete);
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].ids(), &[RecordId::new("a")]);
    assert_eq!(upserted_ids(&rig), vec![vec![RecordId::new("b")]]);
    assert_eq!(rig.backend.ids(PRESETS), ids(&["b"]));

    let status = rig.status(PRESETS);
    assert!(status.pending_tombstones.is_empty());
    assert_eq!(status.last_known_remote, ids(&["b"]));
    assert!(status.is_quiescent());
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn flaky_deletes_converge_with_one_successful_delete() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.backend.insert(&owned_preset("b", "alice", 1));
    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;

    rig.backend.fail_next(PRESETS, CallKind::Delete, Fault::Transport, 2);
    rig.presets.remove(&RecordId::new("a"));
    rig.settle().await;

    assert_eq!(rig.backend.count(PRESETS, CallKind::Delete), 3);
    assert_eq!(rig.backend.confirmed_deletes(PRESETS), vec![RecordId::new("a")]);
    assert_eq!(rig.backend.ids(PRESETS), ids(&["b"]));
    let status = rig.status(PRESETS);
    assert_eq!(status.stats.deletes_failed, 2);
    assert_eq!(status.stats.deletes_confirmed, 1);
    assert!(status.pending_tombstones.is_empty());
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_push_is_retried() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;

    rig.backend.fail_next(PRESETS, CallKind::Upsert, Fault::Transport, 1);
    rig.presets.push(preset("b", "New", 1));
    rig.settle().await;

    assert_eq!(rig.backend.count(PRESETS, CallKind::Upsert), 2);
    assert_eq!(rig.backend.ids(PRESETS), ids(&["a", "b"]));
    assert_eq!(rig.status(PRESETS).stats.pushes_failed, 1);
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn emptied_collection_does_not_wipe_the_remote() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.backend.insert(&owned_preset("b", "alice", 1));
    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;

    rig.presets.clear();
    rig.settle().await;

    assert_eq!(rig.backend.count(PRESETS, CallKind::Upsert), 0);
    assert_eq!(rig.backend.count(PRESETS, CallKind::Delete), 0);
    assert_eq!(rig.backend.ids(PRESETS), ids(&["a", "b"]));
    assert_eq!(rig.status(PRESETS).stats.safety_guard_trips, 1);

    rig.coordinator.force_push(PRESETS).unwrap();
    rig.settle().await;

    assert!(rig.backend.ids(PRESETS).is_empty());
    let status = rig.status(PRESETS);
    assert!(status.last_known_remote.is_empty());
    assert!(status.pending_tombstones.is_empty());
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn tombstones_survive_a_restart() {
    let dir = TempTombstones::new();
    let backend = std::sync::Arc::new(MemoryBackend::new());
    backend.insert(&owned_preset("a", "alice", 0));
    backend.insert(&owned_preset("b", "alice", 1));

    let first = presets_rig()
        .backend(backend.clone())
        .tombstones(dir.open())
        .build();
    first.sign_in("alice");
    first.wait_synced(PRESETS, "alice").await;
    backend.fail_next(PRESETS, CallKind::Delete, Fault::Transport, 10);
    first.presets.remove(&RecordId::new("a"));
    first.settle().await;

    assert_eq!(first.status(PRESETS).pending_tombstones, ids(&["a"]));
    assert_eq!(backend.ids(PRESETS), ids(&["a", "b"]));
    first.shutdown().await;

    backend.clear_faults();
    let second = presets_rig()
        .backend(backend.clone())
        .tombstones(dir.open())
        .build();
    second.sign_in("alice");
    second.wait_synced(PRESETS, "alice").await;
    second.settle().await;

    // The pending delete is not resurrected by the pull and reaches the remote.
    assert_eq!(local_ids(&second), ids(&["b"]));
    assert_eq!(backend.ids(PRESETS), ids(&["b"]));
    assert!(second.status(PRESETS).pending_tombstones.is_empty());
    second.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn recreated_record_is_pushed_after_its_delete_lands() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.backend.insert(&owned_preset("b", "alice", 1));
    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;

    rig.backend.fail_next(PRESETS, CallKind::Delete, Fault::Transport, 1);
    rig.presets.remove(&RecordId::new("a"));
    rig.wait_for(PRESETS, |s| s.stats.deletes_failed == 1).await;
    rig.presets.push(preset("a", "Back again", 0));
    rig.settle().await;

    assert_eq!(rig.backend.ids(PRESETS), ids(&["a", "b"]));
    let stored = rig.backend.records::<FocusPreset>();
    assert_eq!(stored[0].name, "Back again");
    assert!(rig.status(PRESETS).pending_tombstones.is_empty());
    rig.shutdown().await;
}

// ============================================================================
// Session changes
// ============================================================================

#[tokio::test(start_paused = true)]
async fn switching_accounts_never_leaks_records() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a1", "alice", 0));
    rig.backend.insert(&owned_preset("a2", "alice", 1));

    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;
    rig.settle().await;
    rig.backend.clear_calls();

    // Bob has no cloud data; alice's records are still on the device.
    rig.sign_in("bob");
    rig.wait_synced(PRESETS, "bob").await;
    rig.settle().await;

    for call in rig.backend.calls() {
        if let RemoteCall::Fetch { owner, .. } = &call {
            assert_eq!(owner, &OwnerId::new("bob"));
        }
        assert!(!call.ids().contains(&RecordId::new("a1")));
        assert!(!call.ids().contains(&RecordId::new("a2")));
    }
    let status = rig.status(PRESETS);
    assert_eq!(status.stats.foreign_records_skipped, 2);
    for preset in rig.backend.records::<FocusPreset>() {
        let expected = if ["a1", "a2"].contains(&preset.id.as_str()) { "alice" } else { "bob" };
        assert_eq!(preset.owner_id, Some(OwnerId::new(expected)));
    }

    // Bob starts from a seeded collection, not alice's data.
    use focusync_engine::LocalCollection;
    let local = rig.presets.current_value();
    let names: Vec<&str> = local.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Classic", "Deep Work", "Quick Sprint"]);
    assert!(local.iter().all(|p| p.owner_id == Some(OwnerId::new("bob"))));
    assert_eq!(status.last_known_remote, local_ids(&rig));
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn pull_for_a_previous_owner_is_discarded() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a1", "alice", 0));
    rig.backend.insert(&owned_preset("b1", "bob", 0));
    rig.backend.hold_fetches();

    rig.sign_in("alice");
    rig.wait_for(PRESETS, |s| s.pull.in_flight).await;
    rig.sign_in("bob");
    let bob = OwnerId::new("bob");
    rig.wait_for(PRESETS, |s| s.owner() == Some(&bob) && s.pull.in_flight)
        .await;
    rig.backend.release_fetches();
    rig.settle().await;

    let status = rig.status(PRESETS);
    assert_eq!(status.owner(), Some(&bob));
    assert_eq!(status.stats.stale_completions, 1);
    assert_eq!(local_ids(&rig), ids(&["b1"]));
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn signing_out_stops_all_traffic() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;
    rig.backend.clear_calls();

    rig.sign_out();
    rig.wait_for(PRESETS, |s| s.phase == SyncPhase::Idle).await;
    rig.presets.push(preset("b", "Offline", 1));
    rig.presets.remove(&RecordId::new("a"));
    rig.settle().await;

    assert!(rig.backend.calls().is_empty());
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reset_keeps_tombstones_and_bootstraps_again() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.backend.insert(&owned_preset("b", "alice", 1));
    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;

    rig.backend.fail_next(PRESETS, CallKind::Delete, Fault::Auth, 1);
    rig.presets.remove(&RecordId::new("a"));
    rig.wait_for(PRESETS, |s| s.scope.is_none()).await;

    rig.coordinator.disable_and_reset_all();
    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;
    rig.settle().await;

    assert_eq!(rig.backend.ids(PRESETS), ids(&["b"]));
    assert_eq!(rig.backend.count(PRESETS, CallKind::Fetch), 2);
    rig.shutdown().await;
}

// ============================================================================
// Settings singleton
// ============================================================================

#[tokio::test(start_paused = true)]
async fn guest_settings_are_stored_under_the_owner_id() {
    init_tracing();
    let rig = TestRig::builder().only(&[EntityKind::Settings]).build();
    rig.settings.push(UserSettings::default());

    rig.sign_in("alice");
    rig.wait_synced(EntityKind::Settings, "alice").await;
    rig.settle().await;

    assert_eq!(rig.backend.ids(EntityKind::Settings), ids(&["alice"]));
    let stored = rig.backend.records::<UserSettings>();
    assert_eq!(stored[0].owner_id, Some(OwnerId::new("alice")));
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn next_account_gets_its_own_settings() {
    init_tracing();
    let rig = TestRig::builder().only(&[EntityKind::Settings]).build();

    rig.sign_in("alice");
    rig.wait_synced(EntityKind::Settings, "alice").await;
    rig.settle().await;
    rig.sign_in("bob");
    rig.wait_synced(EntityKind::Settings, "bob").await;
    rig.settle().await;

    assert_eq!(rig.backend.ids(EntityKind::Settings), ids(&["alice", "bob"]));
    use focusync_engine::LocalCollection;
    let local = rig.settings.current_value();
    assert_eq!(local, vec![UserSettings::for_owner(&OwnerId::new("bob"))]);
    assert_eq!(rig.status(EntityKind::Settings).last_known_remote, ids(&["bob"]));
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn remote_settings_replace_local_ones() {
    init_tracing();
    let rig = TestRig::builder().only(&[EntityKind::Settings]).build();
    rig.backend.insert(&owned_settings("alice", 90));
    rig.settings.push(UserSettings::default());

    rig.sign_in("alice");
    rig.wait_synced(EntityKind::Settings, "alice").await;
    rig.settle().await;

    use focusync_engine::LocalCollection;
    let local = rig.settings.current_value();
    assert_eq!(local, vec![owned_settings("alice", 90)]);
    assert_eq!(rig.backend.count(EntityKind::Settings, CallKind::Upsert), 0);
    rig.shutdown().await;
}

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test(start_paused = true)]
async fn refresh_pushes_pending_edits_before_pulling() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;
    rig.settle().await;
    rig.backend.clear_calls();

    rig.presets.push(preset("new", "New", 1));
    tokio::time::sleep(Duration::from_millis(20)).await;
    rig.coordinator.refresh_all();
    rig.settle().await;

    assert_eq!(local_ids(&rig), ids(&["a", "new"]));
    assert_eq!(rig.backend.ids(PRESETS), ids(&["a", "new"]));
    let order: Vec<CallKind> = rig.backend.calls().iter().map(RemoteCall::call_kind).collect();
    assert_eq!(order, vec![CallKind::Upsert, CallKind::Fetch]);
    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn edit_during_a_refresh_pull_is_not_overwritten() {
    let rig = presets_rig().build();
    rig.backend.insert(&owned_preset("a", "alice", 0));
    rig.sign_in("alice");
    rig.wait_synced(PRESETS, "alice").await;
    rig.settle().await;
    rig.backend.clear_calls();

    rig.backend.hold_fetches();
    rig.coordinator.refresh_all();
    rig.wait_for(PRESETS, |s| s.pull.in_flight).await;
    rig.presets.push(preset("new", "New", 1));
    rig.wait_for(PRESETS, |s| s.push_pending).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    rig.backend.release_fetches();
    rig.settle().await;

    assert_eq!(local_ids(&rig), ids(&["a", "new"]));
    assert_eq!(rig.backend.ids(PRESETS), ids(&["a", "new"]));
    assert_eq!(rig.backend.count(PRESETS, CallKind::Fetch), 2);
    assert_eq!(rig.status(PRESETS).stats.pulls_deferred, 1);
    rig.shutdown().await;
}

// ============================================================================
// Coordinator
// ============================================================================

#[tokio::test(start_paused = true)]
async fn coordinator_runs_every_collection() {
    init_tracing();
    let rig = TestRig::start();
    rig.backend.insert(&owned_focus_session("s1", "alice", 1_000));

    assert!(!rig.coordinator.start(Vec::new()).unwrap());
    rig.sign_in("alice");
    for kind in EntityKind::ALL {
        rig.wait_synced(kind, "alice").await;
    }
    rig.settle().await;

    let statuses: Vec<SyncerStatus> = rig.coordinator.statuses();
    assert_eq!(statuses.len(), 3);
    assert!(statuses.iter().all(|s| s.phase == SyncPhase::Synced));
    assert_eq!(rig.sessions.len(), 1);
    assert_eq!(rig.backend.ids(EntityKind::Settings), ids(&["alice"]));
    rig.shutdown().await;
}

// ============================================================================
// Properties
// ============================================================================

fn sorted(mut presets: Vec<FocusPreset>) -> Vec<FocusPreset> {
    presets.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    presets
}

proptest! {
    #![proptest_config(PropTestConfig::engine().to_proptest_config())]

    #[test]
    fn pushed_collection_is_pulled_back_on_another_device(
        presets in preset_list_strategy(8),
    ) {
        prop_assume!(!presets.is_empty());
        let alice = OwnerId::new("alice");
        let expected = sorted(
            presets
                .iter()
                .cloned()
                .map(|mut p| {
                    p.assign_owner(&alice);
                    p
                })
                .collect(),
        );

        let pulled = block_on_paused(async {
            let first = presets_rig().presets(presets.clone()).build();
            first.sign_in("alice");
            first.wait_synced(PRESETS, "alice").await;
            first.settle().await;
            let backend = first.backend.clone();
            first.shutdown().await;

            let second = presets_rig().backend(backend).build();
            second.sign_in("alice");
            second.wait_synced(PRESETS, "alice").await;
            second.settle().await;
            use focusync_engine::LocalCollection;
            let pulled = second.presets.current_value();
            second.shutdown().await;
            pulled
        });

        prop_assert_eq!(pulled, expected);
    }

    #[test]
    fn remote_converges_to_local_after_edits(
        initial in preset_list_strategy(6),
        script in edit_script_strategy(10),
    ) {
        let (local, remote) = block_on_paused(async {
            let rig = presets_rig().presets(initial.clone()).build();
            rig.sign_in("alice");
            rig.wait_synced(PRESETS, "alice").await;
            rig.settle().await;

            for op in &script {
                rig.presets.update(|presets| apply_edit(presets, op));
                tokio::time::sleep(Duration::from_millis(60)).await;
            }
            rig.settle().await;
            if rig.presets.is_empty() {
                rig.coordinator.force_push(PRESETS).unwrap();
                rig.settle().await;
            }

            use focusync_engine::LocalCollection;
            let local = rig.presets.current_value();
            let remote = rig.backend.records::<FocusPreset>();
            rig.shutdown().await;
            (local, remote)
        });

        let local_ids: BTreeSet<RecordId> = local.iter().map(|p| p.id.clone()).collect();
        let remote_ids: BTreeSet<RecordId> = remote.iter().map(|p| p.id.clone()).collect();
        prop_assert_eq!(&local_ids, &remote_ids);
        for record in &local {
            let stored = remote.iter().find(|p| p.id == record.id);
            prop_assert_eq!(stored.map(|p| p.name.as_str()), Some(record.name.as_str()));
        }
    }
}
