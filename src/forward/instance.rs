//! One store instance with its own rate limiter and circuit breaker.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::breaker::{BreakerState, CircuitBreaker};
use super::limiter::TokenBucket;
use super::{Endpoint, ForwardError};
use crate::config::ForwardConfig;
use crate::record::ExecutionRecord;

pub struct Instance {
    address: String,
    limiter: TokenBucket,
    breaker: CircuitBreaker,
    remote: Arc<dyn Endpoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub instance: String,
    pub breaker: BreakerState,
}

impl Instance {
    pub fn new(address: impl Into<String>, remote: Arc<dyn Endpoint>, config: &ForwardConfig) -> Self {
        let address = address.into();
        Self {
            limiter: TokenBucket::new(config.rate_per_sec),
            breaker: CircuitBreaker::new(address.clone(), config.breaker.clone()),
            address,
            remote,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn status(&self) -> InstanceStatus {
        InstanceStatus {
            instance: self.address.clone(),
            breaker: self.breaker.state(),
        }
    }
}

#[async_trait]
impl Endpoint for Instance {
    /// Rate limit first, then the breaker, then the remote call. A rate
    /// rejection never reaches the breaker and so never counts against it.
    /// A permanent rejection means the store is up and answering, so the
    /// breaker records it as a success.
    async fn call(&self, record: &ExecutionRecord) -> Result<(), ForwardError> {
        if !self.limiter.try_acquire() {
            return Err(ForwardError::RateLimited {
                instance: self.address.clone(),
            });
        }

        let permit = self
            .breaker
            .try_acquire()
            .ok_or_else(|| ForwardError::CircuitOpen {
                instance: self.address.clone(),
            })?;

        let result = self.remote.call(record).await;
        let healthy = match &result {
            Ok(()) => true,
            Err(e) => e.is_permanent(),
        };
        permit.record(healthy);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Slow {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Endpoint for Slow {
        async fn call(&self, _record: &ExecutionRecord) -> Result<(), ForwardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    struct Refusing {
        status: u16,
    }

    #[async_trait]
    impl Endpoint for Refusing {
        async fn call(&self, _record: &ExecutionRecord) -> Result<(), ForwardError> {
            Err(ForwardError::Rejected {
                instance: "a:1".into(),
                status: self.status,
                message: "refused".into(),
            })
        }
    }

    fn record() -> ExecutionRecord {
        ExecutionRecord::now("ls -la", true, 0, "", "")
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let remote = Arc::new(Slow {
            calls: AtomicUsize::new(0),
        });
        let instance = Instance::new("a:1", remote.clone(), &ForwardConfig::default());
        instance.breaker().trip();

        let err = instance.call(&record()).await.unwrap_err();
        assert!(matches!(err, ForwardError::CircuitOpen { ref instance } if instance == "a:1"));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_call_counts_against_breaker() {
        let remote = Arc::new(Slow {
            calls: AtomicUsize::new(0),
        });
        let config = ForwardConfig {
            breaker: crate::config::BreakerConfig {
                consecutive_failures: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let instance = Instance::new("a:1", remote, &config);

        let res = tokio::time::timeout(Duration::from_millis(10), instance.call(&record())).await;
        assert!(res.is_err());
        assert_eq!(instance.status().breaker, BreakerState::Open);
    }

    #[tokio::test]
    async fn test_client_rejection_does_not_count_against_breaker() {
        let config = ForwardConfig {
            breaker: crate::config::BreakerConfig {
                consecutive_failures: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let instance = Instance::new("a:1", Arc::new(Refusing { status: 413 }), &config);

        for _ in 0..10 {
            let err = instance.call(&record()).await.unwrap_err();
            assert!(matches!(err, ForwardError::Rejected { status: 413, .. }));
        }
        assert_eq!(instance.status().breaker, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_server_error_counts_against_breaker() {
        let config = ForwardConfig {
            breaker: crate::config::BreakerConfig {
                consecutive_failures: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let instance = Instance::new("a:1", Arc::new(Refusing { status: 500 }), &config);

        instance.call(&record()).await.unwrap_err();
        instance.call(&record()).await.unwrap_err();
        assert_eq!(instance.status().breaker, BreakerState::Open);
    }
}
