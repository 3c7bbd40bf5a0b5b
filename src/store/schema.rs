//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::{db_err, MatchError};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), MatchError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        conn.execute_batch(SCHEMA)
            .map_err(db_err("Failed to create tables"))?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, MatchError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(db_err("Failed to create schema_version table"))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), MatchError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(db_err("Failed to clear schema_version"))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(db_err("Failed to set schema_version"))?;
    Ok(())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- One row per unordered pair, normalized so tag_a < tag_b
CREATE TABLE IF NOT EXISTS tag_similarities (
    tag_a INTEGER NOT NULL REFERENCES tags(id),
    tag_b INTEGER NOT NULL REFERENCES tags(id),
    score REAL NOT NULL CHECK (score >= 0.0 AND score <= 1.0),
    PRIMARY KEY (tag_a, tag_b),
    CHECK (tag_a < tag_b)
);

CREATE TABLE IF NOT EXISTS priorities (
    user_id TEXT NOT NULL,
    tag_id INTEGER NOT NULL REFERENCES tags(id),
    priority INTEGER NOT NULL CHECK (priority > 0),
    PRIMARY KEY (user_id, tag_id)
);

CREATE TABLE IF NOT EXISTS supervisor_capacity (
    supervisor_id TEXT PRIMARY KEY NOT NULL,
    total_spots INTEGER NOT NULL CHECK (total_spots >= 0),
    available_spots INTEGER NOT NULL
        CHECK (available_spots >= 0 AND available_spots <= total_spots)
);

-- Rows are never deleted; terminal states form the audit trail
CREATE TABLE IF NOT EXISTS supervision_requests (
    id TEXT PRIMARY KEY NOT NULL,
    student_id TEXT NOT NULL,
    supervisor_id TEXT NOT NULL,
    state TEXT NOT NULL,
    initiated_by TEXT NOT NULL DEFAULT 'student',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_requests_one_pending
    ON supervision_requests(student_id, supervisor_id) WHERE state = 'PENDING';
CREATE INDEX IF NOT EXISTS idx_requests_student ON supervision_requests(student_id, state);
CREATE INDEX IF NOT EXISTS idx_requests_supervisor ON supervision_requests(supervisor_id, state);
"#;
