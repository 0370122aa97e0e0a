//! SQLite storage layer -- connection pool, schema, execution rows.

pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, Row};

use crate::record::ExecutionRecord;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &Path) -> Result<Pool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA busy_timeout = 5000;
                 PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;",
        )
    });

    let pool = R2D2Pool::new(manager)
        .with_context(|| format!("failed to open database {}", path.display()))?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Nanoseconds since the epoch, saturating outside the representable range
/// (roughly years 1677..2262). Records outside it are rejected on insert;
/// saturation only widens query bounds.
pub fn to_nanos(t: DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt()
        .unwrap_or(if t < DateTime::UNIX_EPOCH { i64::MIN } else { i64::MAX })
}

/// Append one execution row.
pub fn insert_execution(conn: &Connection, timestamp_ns: i64, rec: &ExecutionRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO executions (cmd, timestamp_ns, success, exit_code, stdout, stderr)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![rec.cmd, timestamp_ns, rec.success, rec.exit_code, rec.stdout, rec.stderr],
    )?;
    Ok(())
}

/// Rows with `from_ns < timestamp_ns < to_ns`, in insertion order.
pub fn executions_between(conn: &Connection, from_ns: i64, to_ns: i64) -> Result<Vec<ExecutionRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT cmd, timestamp_ns, success, exit_code, stdout, stderr
         FROM executions
         WHERE timestamp_ns > ?1 AND timestamp_ns < ?2
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![from_ns, to_ns], execution_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every row, in insertion order.
pub fn all_executions(conn: &Connection) -> Result<Vec<ExecutionRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT cmd, timestamp_ns, success, exit_code, stdout, stderr
         FROM executions
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], execution_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    Ok(ExecutionRecord {
        cmd: row.get(0)?,
        timestamp_exec: DateTime::from_timestamp_nanos(row.get(1)?),
        success: row.get(2)?,
        exit_code: row.get(3)?,
        stdout: row.get(4)?,
        stderr: row.get(5)?,
    })
}
