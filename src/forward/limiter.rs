//! Non-blocking token bucket.
//!
//! The bucket starts full. Each admitted call takes one token; tokens refill
//! continuously at the configured rate up to the capacity. A call that finds
//! the bucket empty is rejected on the spot instead of waiting.

use std::sync::{Mutex, PoisonError};

use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    rate_per_sec: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    /// A bucket refilling at `rate_per_sec` with a burst capacity of one
    /// second's worth of tokens.
    pub fn new(rate_per_sec: u32) -> Self {
        Self::with_capacity(rate_per_sec, rate_per_sec)
    }

    pub fn with_capacity(rate_per_sec: u32, capacity: u32) -> Self {
        Self {
            rate_per_sec: f64::from(rate_per_sec),
            capacity: f64::from(capacity),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_burst_up_to_capacity_then_rejects() {
        let limiter = TokenBucket::new(100);
        for i in 0..100 {
            assert!(limiter.try_acquire(), "call {i} should be admitted");
        }
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refills_at_rate() {
        let limiter = TokenBucket::with_capacity(10, 2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        // 10/s: one token every 100ms.
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        // Refill never exceeds capacity.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_capacity_rejects_everything() {
        let limiter = TokenBucket::with_capacity(10, 0);
        assert!(!limiter.try_acquire());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!limiter.try_acquire());
    }
}
