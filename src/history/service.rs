//! The history service the store HTTP API talks to.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{HistoryStore, StoreError};
use crate::record::{ExecutionRecord, EXIT_CODE_UNSET};

#[async_trait]
pub trait HistoryService: Send + Sync {
    /// Validate and persist one record.
    async fn store(&self, record: ExecutionRecord) -> Result<(), StoreError>;

    async fn get_from_to(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, StoreError>;

    async fn get_all(&self) -> Result<Vec<ExecutionRecord>, StoreError>;
}

pub type Middleware = Box<dyn FnOnce(Arc<dyn HistoryService>) -> Arc<dyn HistoryService> + Send>;

/// Wrap `base` in each middleware, in order.
pub fn new(store: Arc<dyn HistoryStore>, middleware: Vec<Middleware>) -> Arc<dyn HistoryService> {
    let base: Arc<dyn HistoryService> = Arc::new(BasicHistoryService::new(store));
    middleware.into_iter().fold(base, |svc, wrap| wrap(svc))
}

pub struct BasicHistoryService {
    store: Arc<dyn HistoryStore>,
}

impl BasicHistoryService {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }
}

fn validate(record: &ExecutionRecord) -> Result<(), StoreError> {
    if record.cmd.trim().is_empty() {
        return Err(StoreError::InvalidInput("cmd is required".into()));
    }
    if record.exit_code == EXIT_CODE_UNSET {
        return Err(StoreError::InvalidInput("exit_code is required".into()));
    }
    Ok(())
}

#[async_trait]
impl HistoryService for BasicHistoryService {
    async fn store(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        validate(&record)?;
        self.store.append(record).await
    }

    async fn get_from_to(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        self.store.range_query(from, to).await
    }

    async fn get_all(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        self.store.get_all().await
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

struct LoggingService {
    next: Arc<dyn HistoryService>,
}

#[async_trait]
impl HistoryService for LoggingService {
    async fn store(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        let started = Instant::now();
        let cmd = record.cmd.clone();
        let timestamp_exec = record.timestamp_exec;
        let (success, exit_code) = (record.success, record.exit_code);

        let result = self.next.store(record).await;
        let elapsed_us = started.elapsed().as_micros() as u64;
        match &result {
            Ok(()) => info!(
                method = "store",
                %cmd,
                %timestamp_exec,
                success,
                exit_code,
                elapsed_us,
                "record stored"
            ),
            Err(e) => warn!(method = "store", %cmd, exit_code, elapsed_us, error = %e, "store failed"),
        }
        result
    }

    async fn get_from_to(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let started = Instant::now();
        let result = self.next.get_from_to(from, to).await;
        let elapsed_us = started.elapsed().as_micros() as u64;
        match &result {
            Ok(records) => info!(
                method = "get_from_to",
                %from,
                %to,
                count = records.len(),
                elapsed_us,
                "range query"
            ),
            Err(e) => warn!(method = "get_from_to", %from, %to, error = %e, "range query failed"),
        }
        result
    }

    async fn get_all(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        let result = self.next.get_all().await;
        match &result {
            Ok(records) => info!(method = "get_all", count = records.len(), "full history read"),
            Err(e) => warn!(method = "get_all", error = %e, "full history read failed"),
        }
        result
    }
}

/// Log every call with its outcome.
pub fn logging() -> Middleware {
    Box::new(|next| Arc::new(LoggingService { next }))
}
