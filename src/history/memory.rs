//! In-process history store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{HistoryStore, StoreError};
use crate::record::ExecutionRecord;

#[derive(Debug, Default)]
struct Log {
    records: Vec<ExecutionRecord>,
    closed: bool,
}

/// Records kept in a `Vec` behind a mutex. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    log: Mutex<Log>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn closed() -> StoreError {
    StoreError::Unavailable("store is closed".into())
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        let mut log = self.log.lock().await;
        if log.closed {
            return Err(closed());
        }
        log.records.push(record);
        Ok(())
    }

    async fn range_query(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let log = self.log.lock().await;
        if log.closed {
            return Err(closed());
        }
        Ok(log
            .records
            .iter()
            .filter(|r| r.within(from, to))
            .cloned()
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        let log = self.log.lock().await;
        if log.closed {
            return Err(closed());
        }
        Ok(log.records.clone())
    }

    async fn close(&self) {
        self.log.lock().await.closed = true;
    }
}
