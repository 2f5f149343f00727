//! SQLite store behavior that needs direct access to the database file.

use rusqlite::Connection;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use trellis::audit::MemoryAuditSink;
use trellis::domain::{FlagId, NewFlag};
use trellis::engine::{EngineConfig, FlagEngine, Transition};
use trellis::error::{Error, ErrorKind, StoreError};
use trellis::storage::GraphStore;
use trellis::storage::sqlite::SqliteStore;

async fn open(path: &Path) -> Arc<SqliteStore> {
    Arc::new(
        SqliteStore::open(path, Duration::from_secs(2))
            .await
            .unwrap(),
    )
}

fn ids(raw: &[u64]) -> BTreeSet<FlagId> {
    raw.iter().copied().map(FlagId).collect()
}

/// Run raw SQL through a second connection, as an operator or another
/// process would.
fn execute_externally(path: &Path, sql: &str) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(sql).unwrap();
}

/// Hold the write lock from a second connection for `hold`. Returns once
/// the lock is taken.
fn hold_write_lock(path: &Path, hold: Duration) -> std::thread::JoinHandle<()> {
    let path = path.to_path_buf();
    let (locked_tx, locked_rx) = std::sync::mpsc::channel();
    let holder = std::thread::spawn(move || {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("BEGIN IMMEDIATE").unwrap();
        locked_tx.send(()).unwrap();
        std::thread::sleep(hold);
        conn.execute_batch("COMMIT").unwrap();
    });
    locked_rx.recv().unwrap();
    holder
}

#[tokio::test]
async fn write_blocked_past_its_deadline_reports_timeout_and_commits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flags.db");
    let timeout = Duration::from_millis(200);
    let store = Arc::new(SqliteStore::open(&path, timeout).await.unwrap());
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = FlagEngine::new(
        store.clone(),
        audit.clone(),
        EngineConfig {
            store_timeout: timeout,
            ..EngineConfig::default()
        },
    );
    engine.create(NewFlag::new("a", false, vec![])).await.unwrap();

    let holder = hold_write_lock(&path, Duration::from_millis(800));
    let err = engine
        .create(NewFlag::new("b", false, vec![]))
        .await
        .unwrap_err();
    holder.join().unwrap();

    assert!(matches!(
        err,
        Error::Store(StoreError::Timeout { operation: "create_flag", .. })
    ));
    assert!(err.is_retryable());
    assert!(store.find_by_name("b").await.unwrap().is_none());
    assert_eq!(audit.len().await, 1);

    let retried = engine.create(NewFlag::new("b", false, vec![])).await.unwrap();
    assert_eq!(retried.flag.id, FlagId(2));
    assert_eq!(audit.len().await, 2);
}

#[tokio::test]
async fn write_waits_for_a_short_external_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flags.db");
    let store = Arc::new(
        SqliteStore::open(&path, Duration::from_secs(3))
            .await
            .unwrap(),
    );
    store.create_flag("a", true, &ids(&[])).await.unwrap();
    store.create_flag("b", true, &ids(&[1])).await.unwrap();
    let engine = FlagEngine::new(
        store.clone(),
        Arc::new(MemoryAuditSink::new()),
        EngineConfig::default(),
    );

    let holder = hold_write_lock(&path, Duration::from_millis(300));
    let outcome = engine.deactivate(FlagId(1), "maintenance").await.unwrap();
    holder.join().unwrap();

    match outcome {
        Transition::Applied(report) => assert_eq!(report.cascaded, vec![FlagId(2)]),
        other => panic!("expected an applied transition, got {other:?}"),
    }
    assert!(!store.find_by_id(FlagId(2)).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn failed_cascade_write_rolls_back_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flags.db");
    let store = open(&path).await;
    store.create_flag("a", true, &ids(&[])).await.unwrap();
    store.create_flag("b", true, &ids(&[1])).await.unwrap();
    store.create_flag("c", true, &ids(&[2])).await.unwrap();

    // Fails the third row of the cascade after the first two were updated.
    execute_externally(
        &path,
        "CREATE TRIGGER fail_c BEFORE UPDATE OF is_active ON flags
         WHEN OLD.id = 3
         BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
    );

    let engine = FlagEngine::new(
        store.clone(),
        Arc::new(MemoryAuditSink::new()),
        EngineConfig::default(),
    );
    let err = engine.deactivate(FlagId(1), "outage").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Store);
    for id in 1..=3 {
        let flag = store.find_by_id(FlagId(id)).await.unwrap().unwrap();
        assert!(flag.is_active, "flag {id} changed despite the rollback");
    }
}

#[tokio::test]
async fn failed_edge_insert_rolls_back_the_flag_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flags.db");
    let store = open(&path).await;
    store.create_flag("a", true, &ids(&[])).await.unwrap();

    execute_externally(
        &path,
        "CREATE TRIGGER no_edges BEFORE INSERT ON flag_dependencies
         BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
    );

    let err = store.create_flag("b", false, &ids(&[1])).await.unwrap_err();

    assert!(matches!(err, trellis::error::StoreError::Database(_)));
    assert!(store.find_by_name("b").await.unwrap().is_none());
}

#[tokio::test]
async fn closure_query_terminates_on_externally_seeded_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flags.db");
    let store = open(&path).await;
    store.create_flag("x", false, &ids(&[])).await.unwrap();
    store.create_flag("y", false, &ids(&[1])).await.unwrap();
    store.create_flag("z", false, &ids(&[2])).await.unwrap();

    // x -> z closes the loop x <- y <- z <- x
    execute_externally(
        &path,
        "INSERT INTO flag_dependencies (flag_id, depends_on_id, created_at)
         VALUES (1, 3, '2024-01-01T00:00:00Z');",
    );

    let closure = store.transitive_dependents(FlagId(1)).await.unwrap();
    let closure_ids: Vec<FlagId> = closure.iter().map(|f| f.id).collect();
    assert_eq!(closure_ids, vec![FlagId(2), FlagId(3)]);

    // A flag on a cycle of inactive flags can never be switched on.
    let engine = FlagEngine::new(
        store.clone(),
        Arc::new(MemoryAuditSink::new()),
        EngineConfig::default(),
    );
    let err = engine.activate(FlagId(1), "try").await.unwrap_err();
    assert!(matches!(err, Error::InactiveDependencies { ref inactive } if inactive == &[FlagId(3)]));
}

#[tokio::test]
async fn self_loop_is_excluded_from_closure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flags.db");
    let store = open(&path).await;
    store.create_flag("loop", false, &ids(&[])).await.unwrap();

    execute_externally(
        &path,
        "INSERT INTO flag_dependencies (flag_id, depends_on_id, created_at)
         VALUES (1, 1, '2024-01-01T00:00:00Z');",
    );

    assert!(store.transitive_dependents(FlagId(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn bulk_update_skips_rows_already_in_target_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join("flags.db")).await;
    store.create_flag("on", true, &ids(&[])).await.unwrap();
    store.create_flag("off", false, &ids(&[])).await.unwrap();
    let untouched = store.find_by_id(FlagId(2)).await.unwrap().unwrap();

    let changed = store
        .set_active_for_many(&ids(&[1, 2]), false, true)
        .await
        .unwrap();

    assert_eq!(changed, vec![FlagId(1)]);
    let after = store.find_by_id(FlagId(2)).await.unwrap().unwrap();
    assert_eq!(untouched.updated_at, after.updated_at);
}

#[tokio::test]
async fn bulk_update_with_unknown_id_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join("flags.db")).await;
    store.create_flag("on", true, &ids(&[])).await.unwrap();

    let err = store
        .set_active_for_many(&ids(&[1, 50]), false, false)
        .await
        .unwrap_err();

    assert!(matches!(err, trellis::error::StoreError::MissingFlag(FlagId(50))));
    assert!(store.find_by_id(FlagId(1)).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn lookups_match_the_in_memory_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join("flags.db")).await;
    store.create_flag("a", true, &ids(&[])).await.unwrap();
    store.create_flag("b", true, &ids(&[1])).await.unwrap();

    let found = store.find_by_ids(&ids(&[2, 1, 9])).await.unwrap();
    let found_ids: Vec<FlagId> = found.iter().map(|f| f.id).collect();

    assert_eq!(found_ids, vec![FlagId(1), FlagId(2)]);
    assert!(store.find_by_ids(&ids(&[])).await.unwrap().is_empty());
    assert_eq!(store.direct_dependencies(FlagId(2)).await.unwrap()[0].name, "a");
    assert!(matches!(
        store.direct_dependents(FlagId(9)).await,
        Err(trellis::error::StoreError::MissingFlag(FlagId(9)))
    ));
}
