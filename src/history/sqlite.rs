//! SQLite-backed history store. Survives restarts.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use super::{HistoryStore, StoreError};
use crate::record::ExecutionRecord;
use crate::storage::{self, Pool};

pub struct SqliteStore {
    pool: Pool,
    closed: AtomicBool,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        tracing::info!(db_path = %path.display(), "opening sqlite history store");
        Ok(Self::from_pool(storage::open_pool(path)?))
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool,
            closed: AtomicBool::new(false),
        }
    }

    /// Run `f` on a pooled connection off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("store is closed".into()));
        }
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("storage task failed: {e}")))?
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn append(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        let ts = record.timestamp_exec.timestamp_nanos_opt().ok_or_else(|| {
            StoreError::InvalidInput(format!(
                "timestamp_exec {} is outside the storable range",
                record.timestamp_exec
            ))
        })?;
        self.with_conn(move |conn| Ok(storage::insert_execution(conn, ts, &record)?))
            .await
    }

    async fn range_query(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let (from, to) = (storage::to_nanos(from), storage::to_nanos(to));
        if from >= to {
            return self.with_conn(|_| Ok(Vec::new())).await;
        }
        self.with_conn(move |conn| Ok(storage::executions_between(conn, from, to)?))
            .await
    }

    async fn get_all(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        self.with_conn(|conn| Ok(storage::all_executions(conn)?)).await
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
