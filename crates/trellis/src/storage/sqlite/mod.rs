//! `SQLite` graph store.
//!
//! Flags and edges live in two tables (see `schema`). The connection is
//! shared behind a `std::sync::Mutex` and every call runs on tokio's blocking
//! pool so the async runtime is never stalled by disk I/O.
//!
//! Every write runs inside one `IMMEDIATE` transaction, so the write lock is
//! taken up front and lock waits go through the busy timeout. Each call has a
//! deadline: a write that has not finished by then is rolled back and
//! reported as [`StoreError::Timeout`]. Any other failure drops the
//! transaction and rolls back every row.

// SQLite stores integers as i64; flag ids never approach i64::MAX.
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

mod schema;
mod trait_impl;

use crate::domain::{Flag, FlagId};
use crate::error::StoreError;
use crate::storage::StoreResult;
use rusqlite::{Connection, ErrorCode, Row, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub(crate) use schema::{FLAG_COLUMNS, SCHEMA};

/// `SQLite`-backed [`GraphStore`](crate::storage::GraphStore).
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    timeout: Duration,
}

impl SqliteStore {
    /// Open or create the database at `path` and apply the schema.
    ///
    /// `timeout` is the deadline of each write, waiting for a lock held by
    /// another connection included.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the file cannot be opened or the
    /// schema cannot be applied.
    pub async fn open(path: impl Into<PathBuf>, timeout: Duration) -> StoreResult<Self> {
        let path = path.into();
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || open_connection(&open_path, timeout))
            .await
            .map_err(|e| StoreError::Backend(format!("blocking task failed: {e}")))??;

        tracing::debug!(path = %path.display(), "Opened SQLite store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            timeout,
        })
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_connection<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            op(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("blocking task failed: {e}")))?
    }

    /// Run `op` in an `IMMEDIATE` transaction that commits only if it
    /// finishes before the deadline.
    ///
    /// The deadline starts when the call is made, so time spent queued for
    /// the connection counts against it.
    async fn write<T, F>(&self, operation: &'static str, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> StoreResult<T> + Send + 'static,
    {
        let after = self.timeout;
        let deadline = Instant::now() + after;
        self.with_connection(move |conn| {
            conn.busy_timeout(deadline.saturating_duration_since(Instant::now()))?;
            let result = match write_before(conn, deadline, op) {
                Ok(Some(value)) => Ok(value),
                Ok(None) => Err(StoreError::Timeout { operation, after }),
                Err(e) if is_busy(&e) => Err(StoreError::Timeout { operation, after }),
                Err(e) => Err(e),
            };
            conn.busy_timeout(after)?;
            result
        })
        .await
    }
}

/// Returns `None`, with nothing committed, if `op` ends past `deadline`.
fn write_before<T, F>(conn: &mut Connection, deadline: Instant, op: F) -> StoreResult<Option<T>>
where
    F: FnOnce(&Transaction<'_>) -> StoreResult<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = op(&tx)?;
    if Instant::now() >= deadline {
        // dropping `tx` rolls back
        return Ok(None);
    }
    tx.commit()?;
    Ok(Some(value))
}

fn is_busy(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Database(rusqlite::Error::SqliteFailure(e, _))
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn open_connection(path: &Path, busy_timeout: Duration) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(busy_timeout)?;

    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

fn lock(conn: &Mutex<Connection>) -> StoreResult<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| {
        StoreError::Backend(format!(
            "database connection mutex poisoned (a thread panicked while holding the lock): {e}"
        ))
    })
}

/// Convert a row selected with [`FLAG_COLUMNS`] into a [`Flag`].
pub(crate) fn row_to_flag(row: &Row<'_>) -> rusqlite::Result<Flag> {
    Ok(Flag {
        id: FlagId(row.get::<_, i64>(0)? as u64),
        name: row.get(1)?,
        is_active: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Map a unique-constraint violation on insert to `DuplicateName`.
pub(crate) fn map_insert_error(err: rusqlite::Error, name: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::DuplicateName(name.to_string())
        }
        _ => StoreError::Database(err),
    }
}

pub(crate) fn to_sql_id(id: FlagId) -> i64 {
    id.get() as i64
}
