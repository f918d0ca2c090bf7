//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.
//! Timestamps are stored as fixed-width RFC 3339 UTC text with milliseconds,
//! so text ordering matches time ordering. History dates are `YYYY-MM-DD`.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: active table, completed logs, history
    r#"
    CREATE TABLE IF NOT EXISTS active_tasks (
        employee_id      TEXT PRIMARY KEY,
        task             TEXT NOT NULL,
        department       TEXT NOT NULL,
        start_time       TEXT NOT NULL
    );

    -- Columns stay nullable: rows are validated on read, not on write,
    -- so data from older kiosks can be loaded and skipped if malformed.
    CREATE TABLE IF NOT EXISTS task_logs (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_id      TEXT,
        task             TEXT,
        department       TEXT,
        start_time       TEXT,
        end_time         TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_task_logs_start ON task_logs(start_time);
    CREATE INDEX IF NOT EXISTS idx_task_logs_employee ON task_logs(employee_id);

    CREATE TABLE IF NOT EXISTS history (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_id      TEXT NOT NULL,
        task             TEXT NOT NULL,
        department       TEXT NOT NULL,
        duration_secs    INTEGER NOT NULL,
        date             TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_history_date ON history(date);
    "#,
    // Version 2: idempotent archive batches
    r#"
    CREATE TABLE IF NOT EXISTS archive_batches (
        batch_id         TEXT PRIMARY KEY,
        committed_at     TEXT NOT NULL,
        history_written  INTEGER NOT NULL,
        logs_removed     INTEGER NOT NULL,
        active_removed   INTEGER NOT NULL
    );

    ALTER TABLE history ADD COLUMN batch_id TEXT;
    CREATE INDEX IF NOT EXISTS idx_history_batch ON history(batch_id);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", version))?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
