//! Resilient forwarding of execution records to history store instances.
//!
//! Built once from the configured instance list:
//!
//! ```text
//! Retry(max_attempts, deadline)
//!   └── RoundRobin
//!         ├── Instance(a): TokenBucket → CircuitBreaker → StoreClient
//!         ├── Instance(b): TokenBucket → CircuitBreaker → StoreClient
//!         └── ...
//! ```
//!
//! Each [`Instance`] owns its limiter and breaker; the state lives as long as
//! the [`Forwarder`] and is shared by every concurrent caller. An instance
//! that is open or over its rate fails the attempt instead of being skipped,
//! and the retry policy moves on to the next one.

mod balancer;
mod breaker;
mod client;
mod instance;
mod limiter;
mod retry;

pub use balancer::RoundRobin;
pub use breaker::{BreakerState, CircuitBreaker, Permit};
pub use client::{instance_url, HistoryClient, StoreClient};
pub use instance::{Instance, InstanceStatus};
pub use limiter::TokenBucket;
pub use retry::Retry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::ForwardConfig;
use crate::record::ExecutionRecord;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("{instance}: rate limited")]
    RateLimited { instance: String },
    #[error("{instance}: circuit breaker open")]
    CircuitOpen { instance: String },
    #[error("{instance}: transport error: {source}")]
    Transport {
        instance: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{instance}: store rejected record ({status}): {message}")]
    Rejected {
        instance: String,
        status: u16,
        message: String,
    },
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    #[error("no store instances")]
    NoEndpoints,
    #[error("giving up after {attempts} attempt(s): {last}")]
    RetryExhausted {
        attempts: usize,
        #[source]
        last: Box<ForwardError>,
    },
}

impl ForwardError {
    /// The store answered and refused this record; sending it again, here or
    /// to another instance, gets the same answer. Timeouts and throttling
    /// (408, 429) are not permanent.
    pub fn is_permanent(&self) -> bool {
        match self {
            ForwardError::Rejected { status, .. } => {
                (400..500).contains(status) && !matches!(status, 408 | 429)
            }
            _ => false,
        }
    }
}

/// One way of delivering a record somewhere.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, record: &ExecutionRecord) -> Result<(), ForwardError>;
}

/// Ships execution records to one of several store instances.
pub struct Forwarder {
    instances: Vec<Arc<Instance>>,
    retry: Retry,
}

impl Forwarder {
    /// Build a forwarder over the configured HTTP store instances.
    ///
    /// Returns `None` when no instances are configured: forwarding is then
    /// skipped altogether.
    pub fn from_config(config: &ForwardConfig) -> Result<Option<Self>> {
        if config.instances.is_empty() {
            return Ok(None);
        }
        config.validate()?;

        let http = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        let mut remotes = Vec::with_capacity(config.instances.len());
        for address in &config.instances {
            let client = StoreClient::new(address, http.clone())
                .with_context(|| format!("invalid store instance '{address}'"))?;
            remotes.push((address.clone(), Arc::new(client) as Arc<dyn Endpoint>));
        }

        Ok(Some(Self::build(remotes, config)))
    }

    /// Build a forwarder over arbitrary endpoints, labelled `endpoint-<n>`.
    pub fn from_endpoints(endpoints: Vec<Arc<dyn Endpoint>>, config: &ForwardConfig) -> Self {
        let remotes = endpoints
            .into_iter()
            .enumerate()
            .map(|(i, endpoint)| (format!("endpoint-{i}"), endpoint))
            .collect();
        Self::build(remotes, config)
    }

    fn build(remotes: Vec<(String, Arc<dyn Endpoint>)>, config: &ForwardConfig) -> Self {
        let instances: Vec<Arc<Instance>> = remotes
            .into_iter()
            .map(|(address, remote)| Arc::new(Instance::new(address, remote, config)))
            .collect();

        let balancer = RoundRobin::new(
            instances
                .iter()
                .map(|instance| Arc::clone(instance) as Arc<dyn Endpoint>)
                .collect(),
        );

        info!(
            instances = instances.len(),
            rate_per_sec = config.rate_per_sec,
            max_attempts = config.max_attempts,
            deadline_ms = config.deadline_ms,
            "forwarder ready"
        );

        Self {
            instances,
            retry: Retry::new(balancer, config.max_attempts, config.deadline()),
        }
    }

    /// Deliver one record, retrying across instances within the configured
    /// attempt and time budget.
    pub async fn forward(&self, record: &ExecutionRecord) -> Result<(), ForwardError> {
        self.retry.call(record).await
    }

    pub fn instances(&self) -> &[Arc<Instance>] {
        &self.instances
    }

    pub fn addresses(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.address()).collect()
    }

    /// Breaker state of every instance, in configuration order.
    pub fn status(&self) -> Vec<InstanceStatus> {
        self.instances.iter().map(|i| i.status()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    /// Answers every call with `status`, or succeeds when it is `None`.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        status: Option<u16>,
    }

    impl Counting {
        fn ok() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn failing() -> Arc<Self> {
            Self::rejecting(500)
        }

        fn rejecting(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status: Some(status),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Endpoint for Counting {
        async fn call(&self, _record: &ExecutionRecord) -> Result<(), ForwardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.status {
                Some(status) => Err(ForwardError::Rejected {
                    instance: "counting".into(),
                    status,
                    message: "down".into(),
                }),
                None => Ok(()),
            }
        }
    }

    fn record() -> ExecutionRecord {
        ExecutionRecord::now("echo hi", true, 0, "hi\n", "")
    }

    fn last_error(err: ForwardError) -> ForwardError {
        match err {
            ForwardError::RetryExhausted { last, .. } => *last,
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[test]
    fn test_no_instances_builds_nothing() {
        let fwd = Forwarder::from_config(&ForwardConfig::default()).unwrap();
        assert!(fwd.is_none());
    }

    #[test]
    fn test_invalid_instance_is_a_startup_error() {
        let config = ForwardConfig {
            instances: vec!["http://[::1".into()],
            ..Default::default()
        };
        assert!(Forwarder::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_keeps_instance_order() {
        let config = ForwardConfig {
            instances: vec!["store-a:9001".into(), "http://store-b:9002/store".into()],
            ..Default::default()
        };
        let fwd = Forwarder::from_config(&config).unwrap().unwrap();
        assert_eq!(fwd.addresses(), vec!["store-a:9001", "http://store-b:9002/store"]);
        assert!(fwd.status().iter().all(|s| s.breaker == BreakerState::Closed));
    }

    #[tokio::test]
    async fn test_open_breaker_routes_to_healthy_instance() {
        let down = Counting::ok();
        let healthy = Counting::ok();
        let fwd = Forwarder::from_endpoints(
            vec![down.clone() as Arc<dyn Endpoint>, healthy.clone()],
            &ForwardConfig::default(),
        );
        fwd.instances()[0].breaker().trip();

        for _ in 0..5 {
            fwd.forward(&record()).await.unwrap();
        }
        assert_eq!(down.calls(), 0);
        assert_eq!(healthy.calls(), 5);
    }

    #[tokio::test]
    async fn test_repeated_failures_open_the_breaker() {
        let remote = Counting::failing();
        let config = ForwardConfig {
            breaker: BreakerConfig {
                consecutive_failures: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let fwd = Forwarder::from_endpoints(vec![remote.clone() as Arc<dyn Endpoint>], &config);

        let err = fwd.forward(&record()).await.unwrap_err();
        assert!(matches!(last_error(err), ForwardError::Rejected { .. }));
        assert_eq!(remote.calls(), 3);
        assert_eq!(fwd.status()[0].breaker, BreakerState::Open);

        // Open: short-circuited without touching the remote.
        let err = fwd.forward(&record()).await.unwrap_err();
        assert!(matches!(last_error(err), ForwardError::CircuitOpen { .. }));
        assert_eq!(remote.calls(), 3);
    }

    #[test]
    fn test_only_client_rejections_are_permanent() {
        let rejected = |status| ForwardError::Rejected {
            instance: "a:1".into(),
            status,
            message: String::new(),
        };
        assert!(rejected(400).is_permanent());
        assert!(rejected(413).is_permanent());
        assert!(!rejected(408).is_permanent());
        assert!(!rejected(429).is_permanent());
        assert!(!rejected(500).is_permanent());
        assert!(!rejected(503).is_permanent());
        assert!(!ForwardError::DeadlineExceeded(Duration::from_millis(250)).is_permanent());
        assert!(!ForwardError::CircuitOpen { instance: "a:1".into() }.is_permanent());
    }

    #[tokio::test]
    async fn test_rejected_record_is_not_retried_and_keeps_breaker_closed() {
        let remote = Counting::rejecting(413);
        let config = ForwardConfig {
            breaker: BreakerConfig {
                consecutive_failures: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let fwd = Forwarder::from_endpoints(vec![remote.clone() as Arc<dyn Endpoint>], &config);

        for sent in 1..=10 {
            let err = fwd.forward(&record()).await.unwrap_err();
            match err {
                ForwardError::RetryExhausted { attempts, last } => {
                    assert_eq!(attempts, 1);
                    assert!(matches!(*last, ForwardError::Rejected { status: 413, .. }));
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert_eq!(remote.calls(), sent);
        }
        assert_eq!(fwd.status()[0].breaker, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_without_tripping_breaker() {
        let remote = Counting::ok();
        let config = ForwardConfig {
            rate_per_sec: 1,
            ..Default::default()
        };
        let fwd = Forwarder::from_endpoints(vec![remote.clone() as Arc<dyn Endpoint>], &config);

        fwd.forward(&record()).await.unwrap();
        let err = fwd.forward(&record()).await.unwrap_err();
        assert!(matches!(last_error(err), ForwardError::RateLimited { .. }));
        assert_eq!(remote.calls(), 1);
        assert_eq!(fwd.status()[0].breaker, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_unreachable_instance_fails_within_deadline() {
        // Bind then release a port so nothing is listening on it.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let config = ForwardConfig {
            instances: vec![addr.to_string()],
            ..Default::default()
        };
        let fwd = Forwarder::from_config(&config).unwrap().unwrap();

        let started = Instant::now();
        let err = fwd.forward(&record()).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(matches!(err, ForwardError::RetryExhausted { .. }));
    }

    #[tokio::test]
    async fn test_unresponsive_instance_is_cut_off_at_deadline() {
        // Accepts connections (via the backlog) but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ForwardConfig {
            instances: vec![listener.local_addr().unwrap().to_string()],
            ..Default::default()
        };
        let fwd = Forwarder::from_config(&config).unwrap().unwrap();

        let started = Instant::now();
        let err = fwd.forward(&record()).await.unwrap_err();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(250), "returned after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");
        assert!(matches!(last_error(err), ForwardError::DeadlineExceeded(_)));
        drop(listener);
    }
}
