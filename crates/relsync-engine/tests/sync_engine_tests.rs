//! Sync Engine Tests
//!
//! Covers the reconciliation pass end to end against the in-memory
//! directory:
//! - creating, keeping and removing relationships
//! - idempotence and convergence
//! - ownership-scoped removal and the empty-source guard
//! - skipped rows, per-row failures and run-level failures
//! - single-user scope, dry runs and the run lock

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{directory, engine, internal_port, owned, StaticSource};
use relsync_core::{IdentityKey, RelationshipWriter};
use relsync_engine::{RunStatus, SkipReason, SyncEngine, SyncEvent};

// =============================================================================
// Basic reconciliation
// =============================================================================

#[tokio::test]
async fn test_new_relationship_is_assigned_in_object_context() {
    let dir = Arc::new(directory());
    let source = Arc::new(StaticSource::new(&[("mentor", "alice", "bob")]));

    let report = engine(source.clone(), dir.clone()).await.sync(None, false).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.statistics().assigned, 1);

    let assignments = dir.all_assignments().await;
    assert_eq!(assignments.len(), 1);
    let created = &assignments[0];
    assert_eq!(created.role_id.value(), 5);
    assert_eq!(created.subject, IdentityKey::new(10));
    assert_eq!(created.object, IdentityKey::new(20));
    assert_eq!(Some(created.context_id), dir.context_of(IdentityKey::new(20)).await);
    assert_eq!(created.component, "relsync");
}

#[tokio::test]
async fn test_existing_relationship_is_kept() {
    let dir = Arc::new(directory().with_assignment(5, 10, 20, "relsync"));
    let source = Arc::new(StaticSource::new(&[("mentor", "alice", "bob")]));

    let report = engine(source, dir.clone()).await.sync(None, false).await;

    let stats = report.statistics();
    assert_eq!(stats.assigned, 0);
    assert_eq!(stats.unassigned, 0);
    assert_eq!(stats.already_present, 1);
    assert!(report.events.contains(&SyncEvent::AlreadyPresent {
        key: "mentor|10|20".to_string()
    }));
    assert_eq!(owned(&dir, "relsync").await, vec!["5|10|20"]);
}

#[tokio::test]
async fn test_relationship_missing_from_source_is_removed() {
    let dir = Arc::new(
        directory()
            .with_assignment(5, 10, 20, "relsync")
            .with_assignment(6, 10, 30, "relsync"),
    );
    let source = Arc::new(StaticSource::new(&[("mentor", "alice", "bob")]));

    let report = engine(source, dir.clone()).await.sync(None, false).await;

    let stats = report.statistics();
    assert_eq!(stats.already_present, 1);
    assert_eq!(stats.assigned, 0);
    assert_eq!(stats.unassigned, 1);
    assert!(report.events.contains(&SyncEvent::Unassigned {
        key: "tutor|10|30".to_string()
    }));
    assert_eq!(owned(&dir, "relsync").await, vec!["5|10|20"]);
}

#[tokio::test]
async fn test_role_values_match_case_insensitively() {
    let dir = Arc::new(directory().with_assignment(5, 10, 20, "relsync"));
    let source = Arc::new(StaticSource::new(&[(" Mentor ", "alice", "bob")]));

    let report = engine(source, dir.clone()).await.sync(None, false).await;

    assert_eq!(report.statistics().already_present, 1);
    assert_eq!(report.statistics().unassigned, 0);
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let dir = Arc::new(directory().with_assignment(7, 40, 30, "relsync"));
    let source = Arc::new(StaticSource::new(&[
        ("mentor", "alice", "bob"),
        ("tutor", "carol", "bob"),
        ("parent", "dave", "alice"),
    ]));

    let first = engine(source.clone(), dir.clone()).await.sync(None, false).await;
    assert_eq!(first.statistics().assigned, 3);
    assert_eq!(first.statistics().unassigned, 1);

    let second = engine(source, dir.clone()).await.sync(None, false).await;
    let stats = second.statistics();
    assert_eq!(stats.assigned, 0);
    assert_eq!(stats.unassigned, 0);
    assert_eq!(stats.already_present, 3);
}

#[tokio::test]
async fn test_owned_set_converges_to_resolvable_source_rows() {
    let dir = Arc::new(
        directory()
            .with_assignment(5, 10, 20, "relsync")
            .with_assignment(6, 20, 10, "relsync")
            .with_assignment(7, 30, 40, "relsync"),
    );
    let source = Arc::new(StaticSource::new(&[
        ("mentor", "alice", "bob"),
        ("parent", "carol", "dave"),
        ("tutor", "dave", "carol"),
        ("mentor", "ghost", "bob"),
        ("warden", "alice", "bob"),
        ("tutor", "alice", "nobody"),
    ]));

    engine(source, dir.clone()).await.sync(None, false).await;

    assert_eq!(
        owned(&dir, "relsync").await,
        vec!["5|10|20", "6|40|30", "7|30|40"]
    );
}

#[tokio::test]
async fn test_foreign_assignments_are_never_removed() {
    let dir = Arc::new(
        directory()
            .with_assignment(6, 10, 30, "manual")
            .with_assignment(5, 10, 20, "manual")
            .with_assignment(7, 20, 40, "relsync"),
    );
    let source = Arc::new(StaticSource::new(&[("mentor", "alice", "bob")]));

    let report = engine(source, dir.clone()).await.sync(None, false).await;

    assert_eq!(owned(&dir, "manual").await, vec!["5|10|20", "6|10|30"]);
    // Ours is created alongside the identical manual one; the stale one goes.
    assert_eq!(owned(&dir, "relsync").await, vec!["5|10|20"]);
    assert_eq!(report.statistics().unassigned, 1);
}

#[tokio::test]
async fn test_empty_source_leaves_store_untouched() {
    let dir = Arc::new(
        directory()
            .with_assignment(5, 10, 20, "relsync")
            .with_assignment(6, 10, 30, "relsync"),
    );
    let source = Arc::new(StaticSource::new(&[]));

    let report = engine(source.clone(), dir.clone()).await.sync(None, true).await;

    assert_eq!(report.status, RunStatus::NothingToDo);
    assert_eq!(report.exit_code(), 0);
    assert!(report.events.contains(&SyncEvent::EmptySource));
    assert_eq!(owned(&dir, "relsync").await, vec!["5|10|20", "6|10|30"]);
    assert_eq!(source.shutdown_calls(), 1);
}

#[tokio::test]
async fn test_unknown_role_is_skipped_once() {
    let dir = Arc::new(directory().with_assignment(5, 10, 20, "relsync"));
    let source = Arc::new(StaticSource::new(&[
        ("mentor", "alice", "bob"),
        ("unknownrole", "alice", "carol"),
    ]));

    let report = engine(source, dir.clone()).await.sync(None, false).await;

    let skipped: Vec<_> = report.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].0, "unknownrole|alice|carol");
    assert_eq!(
        skipped[0].1,
        &SkipReason::UnknownRole {
            role: "unknownrole".to_string()
        }
    );
    assert_eq!(report.statistics().unassigned, 0);
    assert_eq!(owned(&dir, "relsync").await, vec!["5|10|20"]);
}

#[tokio::test]
async fn test_unknown_subject_and_object_are_skipped() {
    let dir = Arc::new(directory());
    let source = Arc::new(StaticSource::new(&[
        ("mentor", "ghost", "bob"),
        ("mentor", "alice", "phantom"),
    ]));

    let report = engine(source, dir.clone()).await.sync(None, false).await;

    let reasons: Vec<_> = report.skipped().map(|(_, reason)| reason.clone()).collect();
    assert!(reasons.contains(&SkipReason::UnknownSubject {
        value: "ghost".to_string()
    }));
    assert!(reasons.contains(&SkipReason::UnknownObject {
        value: "phantom".to_string()
    }));
    assert!(dir.all_assignments().await.is_empty());
    assert_eq!(report.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_verbosity_does_not_change_outcome() {
    let rows = [
        ("mentor", "alice", "bob"),
        ("ghostrole", "alice", "bob"),
        ("tutor", "carol", "dave"),
    ];

    let quiet_dir = Arc::new(directory().with_assignment(7, 40, 30, "relsync"));
    let quiet = engine(Arc::new(StaticSource::new(&rows)), quiet_dir.clone())
        .await
        .sync(None, false)
        .await;

    let loud_dir = Arc::new(directory().with_assignment(7, 40, 30, "relsync"));
    let loud = engine(Arc::new(StaticSource::new(&rows)), loud_dir.clone())
        .await
        .sync(None, true)
        .await;

    assert_eq!(quiet.events, loud.events);
    assert_eq!(owned(&quiet_dir, "relsync").await, owned(&loud_dir, "relsync").await);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failed_assignment_does_not_stop_the_run() {
    let dir = Arc::new(directory().with_assignment(6, 10, 30, "relsync"));
    dir.faults().fail_inserts.store(true, Ordering::SeqCst);
    let source = Arc::new(StaticSource::new(&[
        ("mentor", "alice", "bob"),
        ("parent", "dave", "carol"),
    ]));

    let report = engine(source, dir.clone()).await.sync(None, false).await;

    let stats = report.statistics();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.unassigned, 1);
    assert_eq!(report.status, RunStatus::Completed);
    assert!(dir.all_assignments().await.is_empty());
}

#[tokio::test]
async fn test_failed_unassignment_is_reported() {
    let dir = Arc::new(directory().with_assignment(6, 10, 30, "relsync"));
    dir.faults().fail_deletes.store(true, Ordering::SeqCst);
    let source = Arc::new(StaticSource::new(&[("mentor", "alice", "bob")]));

    let report = engine(source, dir.clone()).await.sync(None, false).await;

    assert!(report
        .events
        .iter()
        .any(|e| matches!(e, SyncEvent::UnassignFailed { key, .. } if key == "tutor|10|30")));
    assert_eq!(report.statistics().assigned, 1);
}

#[tokio::test]
async fn test_external_read_failure_fails_the_run_and_shuts_down() {
    let dir = Arc::new(directory().with_assignment(5, 10, 20, "relsync"));
    let source = Arc::new(StaticSource::new(&[("mentor", "alice", "bob")]).with_read_error());

    let report = engine(source.clone(), dir.clone()).await.sync(None, false).await;

    assert!(matches!(report.status, RunStatus::Failed { ref code, .. } if code == "DATA_ACCESS_ERROR"));
    assert_eq!(report.exit_code(), 2);
    assert_eq!(source.shutdown_calls(), 1);
    assert_eq!(owned(&dir, "relsync").await, vec!["5|10|20"]);
    assert!(!dir.is_locked(relsync_directory::run_lock_key("relsync")).await);
}

#[tokio::test]
async fn test_role_read_failure_fails_the_run() {
    let dir = Arc::new(directory());
    dir.faults().fail_role_reads.store(true, Ordering::SeqCst);
    let source = Arc::new(StaticSource::new(&[("mentor", "alice", "bob")]));

    let report = engine(source.clone(), dir.clone()).await.sync(None, false).await;

    assert!(matches!(report.status, RunStatus::Failed { ref code, .. } if code == "ROLE_FETCH_ERROR"));
    assert_eq!(report.exit_code(), 2);
    assert!(dir.all_assignments().await.is_empty());
    assert_eq!(source.shutdown_calls(), 1);
}

#[tokio::test]
async fn test_engine_requires_a_writable_internal_port() {
    let source = Arc::new(StaticSource::new(&[]));
    let other = Arc::new(StaticSource::new(&[]));

    assert!(SyncEngine::new(source, other).is_err());
}

// =============================================================================
// Scope, dry run and locking
// =============================================================================

#[tokio::test]
async fn test_single_user_run_is_scoped() {
    let dir = Arc::new(
        directory()
            .with_assignment(6, 30, 40, "relsync")
            .with_assignment(7, 20, 40, "relsync"),
    );
    let source = Arc::new(StaticSource::new(&[
        ("mentor", "alice", "bob"),
        ("tutor", "carol", "alice"),
        ("parent", "carol", "dave"),
    ]));

    let report = engine(source.clone(), dir.clone())
        .await
        .sync(Some(IdentityKey::new(20)), false)
        .await;

    assert_eq!(
        source.last_filters(),
        Some((Some("bob".to_string()), Some("bob".to_string())))
    );
    assert_eq!(report.statistics().external_rows, 1);
    assert_eq!(report.statistics().existing, 1);
    // bob's stale parent assignment goes; carol's tutor assignment is out of scope.
    assert_eq!(owned(&dir, "relsync").await, vec!["5|10|20", "6|30|40"]);
}

#[tokio::test]
async fn test_unmapped_user_ends_the_run_early() {
    let dir = Arc::new(directory());
    let source = Arc::new(StaticSource::new(&[("mentor", "alice", "bob")]));

    let report = engine(source.clone(), dir)
        .await
        .sync(Some(IdentityKey::new(999)), false)
        .await;

    assert_eq!(report.status, RunStatus::NothingToDo);
    assert_eq!(source.read_calls(), 0);
    assert_eq!(source.shutdown_calls(), 1);
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let dir = Arc::new(directory().with_assignment(6, 10, 30, "relsync"));
    let source = Arc::new(StaticSource::new(&[("mentor", "alice", "bob")]));

    let report = engine(source, dir.clone())
        .await
        .with_dry_run(true)
        .sync(None, false)
        .await;

    assert!(report.dry_run);
    assert!(report.events.contains(&SyncEvent::WouldAssign {
        key: "mentor|10|20".to_string()
    }));
    assert!(report.events.contains(&SyncEvent::WouldUnassign {
        key: "tutor|10|30".to_string()
    }));
    assert_eq!(report.statistics().planned, 2);
    assert_eq!(owned(&dir, "relsync").await, vec!["6|10|30"]);
}

#[tokio::test]
async fn test_concurrent_run_is_locked_out() {
    let dir = Arc::new(directory());
    let holder = internal_port(dir.clone()).await;
    assert!(holder.try_lock_run().await.unwrap());

    let source = Arc::new(StaticSource::new(&[("mentor", "alice", "bob")]));
    let report = engine(source.clone(), dir.clone()).await.sync(None, false).await;

    assert_eq!(report.status, RunStatus::Locked);
    assert_eq!(report.exit_code(), 3);
    assert_eq!(source.read_calls(), 0);
    assert!(dir.all_assignments().await.is_empty());

    holder.unlock_run().await.unwrap();
    let report = engine(source, dir.clone()).await.sync(None, false).await;
    assert_eq!(report.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_duplicate_source_rows_are_applied_once() {
    let dir = Arc::new(directory());
    let source = Arc::new(StaticSource::new(&[
        ("mentor", "alice", "bob"),
        ("MENTOR", "alice", "bob"),
    ]));

    let report = engine(source, dir.clone()).await.sync(None, false).await;

    assert_eq!(report.statistics().assigned, 1);
    assert_eq!(report.statistics().already_present, 1);
    assert_eq!(dir.all_assignments().await.len(), 1);
}
