//! End-to-end runs reading the external side from SQLite.

mod common;

use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

use common::{directory, internal_port, owned};
use relsync_connector_database::{ExternalDataPort, ExternalSourceConfig};
use relsync_core::{DataPort, IdentityKey};
use relsync_engine::{RunStatus, SyncEngine};

async fn external(rows: &[(&str, &str, &str)]) -> Arc<ExternalDataPort> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    sqlx::query("CREATE TABLE links (kind TEXT, mentor TEXT, learner TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    for (kind, mentor, learner) in rows {
        sqlx::query("INSERT INTO links (kind, mentor, learner) VALUES (?, ?, ?)")
            .bind(*kind)
            .bind(*mentor)
            .bind(*learner)
            .execute(&pool)
            .await
            .unwrap();
    }

    let config =
        ExternalSourceConfig::sqlite(":memory:", "links").with_fields("kind", "mentor", "learner");
    Arc::new(ExternalDataPort::with_pool(config, pool).unwrap())
}

#[tokio::test]
async fn test_full_run_from_sqlite() {
    let dir = Arc::new(directory().with_assignment(6, 10, 30, "relsync"));
    let source = external(&[
        ("mentor", "alice", "bob"),
        ("parent", "dave", "carol"),
        ("ghost", "alice", "bob"),
    ])
    .await;

    let report = SyncEngine::new(source, internal_port(dir.clone()).await)
        .unwrap()
        .sync(None, true)
        .await;

    assert_eq!(report.status, RunStatus::Completed);
    let stats = report.statistics();
    assert_eq!(stats.external_rows, 3);
    assert_eq!(stats.assigned, 2);
    assert_eq!(stats.unassigned, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(owned(&dir, "relsync").await, vec!["5|10|20", "7|40|30"]);
}

#[tokio::test]
async fn test_single_user_run_from_sqlite() {
    let dir = Arc::new(directory());
    let source = external(&[
        ("mentor", "alice", "bob"),
        ("tutor", "carol", "alice"),
        ("parent", "dave", "carol"),
    ])
    .await;

    let report = SyncEngine::new(source, internal_port(dir.clone()).await)
        .unwrap()
        .sync(Some(IdentityKey::new(10)), false)
        .await;

    assert_eq!(report.statistics().external_rows, 2);
    assert_eq!(owned(&dir, "relsync").await, vec!["5|10|20", "6|30|10"]);
}

#[tokio::test]
async fn test_external_port_is_shut_down_after_run() {
    let dir = Arc::new(directory());
    let source = external(&[("mentor", "alice", "bob")]).await;

    SyncEngine::new(source.clone(), internal_port(dir).await)
        .unwrap()
        .sync(None, false)
        .await;

    // The pool is closed; another read fails.
    assert!(source.relationships_in_scope(None, None).await.is_err());
}
