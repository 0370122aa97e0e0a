//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- id preserves insertion order; timestamp_ns is nanoseconds since the
        -- Unix epoch (UTC).
        CREATE TABLE IF NOT EXISTS executions (
            id INTEGER PRIMARY KEY,
            cmd TEXT NOT NULL,
            timestamp_ns INTEGER NOT NULL,
            success INTEGER NOT NULL,
            exit_code INTEGER NOT NULL,
            stdout TEXT NOT NULL DEFAULT '',
            stderr TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_executions_timestamp ON executions(timestamp_ns);

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);",
    )?;

    Ok(())
}
