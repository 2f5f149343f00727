//! Database schema for the SQLite store.

/// DDL applied on every open; idempotent.
pub(crate) const SCHEMA: &str = r"
-- Feature flags
CREATE TABLE IF NOT EXISTS flags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    is_active INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Dependency edges: flag_id may only be active while depends_on_id is active
CREATE TABLE IF NOT EXISTS flag_dependencies (
    flag_id INTEGER NOT NULL REFERENCES flags(id),
    depends_on_id INTEGER NOT NULL REFERENCES flags(id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (flag_id, depends_on_id)
);

CREATE INDEX IF NOT EXISTS idx_flag_dependencies_depends_on
    ON flag_dependencies(depends_on_id);
";

/// Column list for the flags table, in the order `row_to_flag` expects.
pub(crate) const FLAG_COLUMNS: &str = "id, name, is_active, created_at, updated_at";
