//! `GraphStore` implementation for the SQLite store.

use super::{FLAG_COLUMNS, SqliteStore, map_insert_error, row_to_flag, to_sql_id};
use crate::domain::{Flag, FlagId};
use crate::error::StoreError;
use crate::storage::{GraphStore, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::BTreeSet;

fn query_flags(conn: &Connection, sql: &str, id: FlagId) -> StoreResult<Vec<Flag>> {
    let mut stmt = conn.prepare(sql)?;
    let flags = stmt
        .query_map([to_sql_id(id)], row_to_flag)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(flags)
}

fn flag_exists(conn: &Connection, id: FlagId) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM flags WHERE id = ?1", [to_sql_id(id)], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

fn is_active(conn: &Connection, id: FlagId) -> StoreResult<Option<bool>> {
    let active = conn
        .query_row("SELECT is_active FROM flags WHERE id = ?1", [to_sql_id(id)], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(active)
}

/// Direct dependencies of `id` that are inactive, ascending.
fn inactive_dependencies(conn: &Connection, id: FlagId) -> StoreResult<Vec<FlagId>> {
    let mut stmt = conn.prepare(
        "SELECT d.id
         FROM flag_dependencies fd
         JOIN flags d ON d.id = fd.depends_on_id
         WHERE fd.flag_id = ?1 AND d.is_active = 0
         ORDER BY d.id",
    )?;
    let ids = stmt
        .query_map([to_sql_id(id)], |row| row.get::<_, i64>(0))?
        .map(|id| id.map(|raw| FlagId(raw as u64)))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

fn require_flag(conn: &Connection, id: FlagId) -> StoreResult<()> {
    if flag_exists(conn, id)? {
        Ok(())
    } else {
        Err(StoreError::MissingFlag(id))
    }
}

#[async_trait]
impl GraphStore for SqliteStore {
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Flag>> {
        let name = name.to_string();
        self.with_connection(move |conn| {
            let flag = conn
                .query_row(
                    &format!("SELECT {FLAG_COLUMNS} FROM flags WHERE name = ?1"),
                    [&name],
                    row_to_flag,
                )
                .optional()?;
            Ok(flag)
        })
        .await
    }

    async fn find_by_id(&self, id: FlagId) -> StoreResult<Option<Flag>> {
        self.with_connection(move |conn| {
            let flag = conn
                .query_row(
                    &format!("SELECT {FLAG_COLUMNS} FROM flags WHERE id = ?1"),
                    [to_sql_id(id)],
                    row_to_flag,
                )
                .optional()?;
            Ok(flag)
        })
        .await
    }

    async fn find_by_ids(&self, ids: &BTreeSet<FlagId>) -> StoreResult<Vec<Flag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<i64> = ids.iter().copied().map(to_sql_id).collect();
        self.with_connection(move |conn| {
            let placeholders = vec!["?"; raw.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {FLAG_COLUMNS} FROM flags WHERE id IN ({placeholders}) ORDER BY id"
            ))?;
            let flags = stmt
                .query_map(params_from_iter(raw.iter()), row_to_flag)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(flags)
        })
        .await
    }

    async fn direct_dependencies(&self, id: FlagId) -> StoreResult<Vec<Flag>> {
        self.with_connection(move |conn| {
            require_flag(conn, id)?;
            query_flags(
                conn,
                "SELECT f.id, f.name, f.is_active, f.created_at, f.updated_at
                 FROM flags f
                 JOIN flag_dependencies fd ON fd.depends_on_id = f.id
                 WHERE fd.flag_id = ?1
                 ORDER BY f.id",
                id,
            )
        })
        .await
    }

    async fn direct_dependents(&self, id: FlagId) -> StoreResult<Vec<Flag>> {
        self.with_connection(move |conn| {
            require_flag(conn, id)?;
            query_flags(
                conn,
                "SELECT f.id, f.name, f.is_active, f.created_at, f.updated_at
                 FROM flags f
                 JOIN flag_dependencies fd ON fd.flag_id = f.id
                 WHERE fd.depends_on_id = ?1
                 ORDER BY f.id",
                id,
            )
        })
        .await
    }

    async fn transitive_dependents(&self, id: FlagId) -> StoreResult<Vec<Flag>> {
        self.with_connection(move |conn| {
            require_flag(conn, id)?;
            // UNION (not UNION ALL) discards rows already produced, so cycles terminate.
            query_flags(
                conn,
                &format!(
                    "WITH RECURSIVE dependent_tree(id) AS (
                        SELECT flag_id FROM flag_dependencies WHERE depends_on_id = ?1

                        UNION

                        SELECT fd.flag_id
                        FROM flag_dependencies fd
                        JOIN dependent_tree dt ON fd.depends_on_id = dt.id
                    )
                    SELECT {FLAG_COLUMNS}
                    FROM flags
                    WHERE id IN (SELECT id FROM dependent_tree) AND id <> ?1
                    ORDER BY id"
                ),
                id,
            )
        })
        .await
    }

    async fn create_flag(
        &self,
        name: &str,
        active: bool,
        dependency_ids: &BTreeSet<FlagId>,
    ) -> StoreResult<Flag> {
        let name = name.to_string();
        let dependency_ids = dependency_ids.clone();
        self.write("create_flag", move |tx| {
            let mut inactive = Vec::new();
            for dependency in &dependency_ids {
                match is_active(tx, *dependency)? {
                    None => return Err(StoreError::MissingFlag(*dependency)),
                    Some(false) => inactive.push(*dependency),
                    Some(true) => {}
                }
            }
            if active && !inactive.is_empty() {
                return Err(StoreError::InactiveDependencies(inactive));
            }

            let now = Utc::now();
            tx.execute(
                "INSERT INTO flags (name, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![name, active, now],
            )
            .map_err(|e| map_insert_error(e, &name))?;
            let id = FlagId(tx.last_insert_rowid() as u64);

            let mut insert_edge = tx.prepare(
                "INSERT INTO flag_dependencies (flag_id, depends_on_id, created_at)
                 VALUES (?1, ?2, ?3)",
            )?;
            for dependency in &dependency_ids {
                insert_edge.execute(params![to_sql_id(id), to_sql_id(*dependency), now])?;
            }

            let flag = tx.query_row(
                &format!("SELECT {FLAG_COLUMNS} FROM flags WHERE id = ?1"),
                [to_sql_id(id)],
                row_to_flag,
            )?;
            Ok(flag)
        })
        .await
    }

    async fn set_active(&self, id: FlagId, active: bool) -> StoreResult<bool> {
        self.write("set_active", move |tx| {
            require_flag(tx, id)?;
            if active {
                let inactive = inactive_dependencies(tx, id)?;
                if !inactive.is_empty() {
                    return Err(StoreError::InactiveDependencies(inactive));
                }
            }
            let changed = tx.execute(
                "UPDATE flags SET is_active = ?2, updated_at = ?3
                 WHERE id = ?1 AND is_active <> ?2",
                params![to_sql_id(id), active, Utc::now()],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn set_active_for_many(
        &self,
        ids: &BTreeSet<FlagId>,
        active: bool,
        only_if_currently_active: bool,
    ) -> StoreResult<Vec<FlagId>> {
        let ids = ids.clone();
        self.write("set_active_for_many", move |tx| {
            for id in &ids {
                require_flag(tx, *id)?;
            }

            let now = Utc::now();
            let mut changed = Vec::new();
            let mut update = tx.prepare(
                "UPDATE flags SET is_active = ?2, updated_at = ?4
                 WHERE id = ?1 AND is_active <> ?2 AND (?3 = 0 OR is_active = 1)",
            )?;
            for id in &ids {
                let rows =
                    update.execute(params![to_sql_id(*id), active, only_if_currently_active, now])?;
                if rows > 0 {
                    changed.push(*id);
                }
            }

            // Reads inside the transaction see the rows written above.
            if active {
                let mut inactive = BTreeSet::new();
                for id in &changed {
                    inactive.extend(inactive_dependencies(tx, *id)?);
                }
                if !inactive.is_empty() {
                    return Err(StoreError::InactiveDependencies(inactive.into_iter().collect()));
                }
            }
            Ok(changed)
        })
        .await
    }
}
