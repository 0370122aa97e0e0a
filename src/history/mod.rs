//! Time-indexed history of execution records.
//!
//! [`HistoryStore`] is the storage seam: an append-only log of records with
//! range and full reads. [`HistoryService`] sits on top and validates what
//! the HTTP layer hands it.

mod memory;
mod service;
mod sqlite;

pub use memory::MemoryStore;
pub use service::{logging, new, BasicHistoryService, HistoryService, Middleware};
pub use sqlite::SqliteStore;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};
use crate::record::ExecutionRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The record failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The store is closed or its backend failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        Self::Unavailable(format!("{e:#}"))
    }
}

/// Append-only record log.
///
/// Implementations are safe to share between concurrent callers; every
/// successful append is visible to reads that start after it returns.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: ExecutionRecord) -> Result<(), StoreError>;

    /// Records with `from < timestamp_exec < to`, in insertion order.
    async fn range_query(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Every record, in insertion order.
    async fn get_all(&self) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Refuse further operations. Idempotent.
    async fn close(&self);
}

/// Open the store selected by `config.backend`.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn HistoryStore>> {
    let store: Arc<dyn HistoryStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&config.db_path)?),
    };
    info!(backend = ?config.backend, "history store opened");
    Ok(store)
}
