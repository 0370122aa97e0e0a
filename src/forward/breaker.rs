//! Per-instance circuit breaker.
//!
//! State machine: Closed → Open → HalfOpen
//! - Closed: calls pass, consecutive failures are counted; the breaker opens
//!   once they exceed the configured threshold.
//! - Open: calls are rejected until the open timeout elapses.
//! - HalfOpen: a limited number of trial calls are admitted. Enough
//!   consecutive successes close the breaker; any failure reopens it.
//!
//! Every state change starts a new generation. A result reported against an
//! older generation is ignored, so a slow call admitted before the breaker
//! opened cannot close it again.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    generation: u64,
    /// Calls admitted in the current generation.
    requests: u32,
    consecutive_successes: u32,
    consecutive_failures: u32,
    /// When an open breaker may start admitting trial calls.
    reopen_at: Option<Instant>,
}

impl Inner {
    fn set_state(&mut self, state: BreakerState, config: &BreakerConfig, now: Instant) {
        self.state = state;
        self.generation += 1;
        self.requests = 0;
        self.consecutive_successes = 0;
        self.consecutive_failures = 0;
        self.reopen_at = match state {
            BreakerState::Open => Some(now + config.open_timeout()),
            _ => None,
        };
    }
}

/// Circuit breaker guarding calls to one store instance.
///
/// Internally synchronized; share it behind an `Arc`.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                generation: 0,
                requests: 0,
                consecutive_successes: 0,
                consecutive_failures: 0,
                reopen_at: None,
            }),
        }
    }

    /// Current state, after applying any due Open → HalfOpen transition.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    /// Ask to make a call. `None` means the call must be short-circuited.
    ///
    /// The returned permit must be settled with [`Permit::record`]; a permit
    /// dropped unsettled (the call was abandoned) counts as a failure.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());

        match inner.state {
            BreakerState::Open => return None,
            BreakerState::HalfOpen if inner.requests >= self.config.half_open_max_requests => {
                return None
            }
            _ => {}
        }
        inner.requests = inner.requests.saturating_add(1);

        Some(Permit {
            breaker: self,
            generation: inner.generation,
            settled: false,
        })
    }

    /// Force the breaker open, as if the failure threshold had been crossed.
    pub fn trip(&self) {
        let mut inner = self.lock();
        warn!(instance = %self.name, "circuit breaker forced open");
        inner.set_state(BreakerState::Open, &self.config, Instant::now());
    }

    fn on_result(&self, generation: u64, success: bool) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        if inner.generation != generation {
            return;
        }

        match (inner.state, success) {
            (BreakerState::Closed, true) => {
                inner.consecutive_failures = 0;
                inner.consecutive_successes = inner.consecutive_successes.saturating_add(1);
            }
            (BreakerState::Closed, false) => {
                inner.consecutive_successes = 0;
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures > self.config.consecutive_failures {
                    warn!(
                        instance = %self.name,
                        failures = inner.consecutive_failures,
                        open_timeout_secs = self.config.open_timeout_secs,
                        "circuit breaker tripped, transitioning to Open"
                    );
                    inner.set_state(BreakerState::Open, &self.config, now);
                }
            }
            (BreakerState::HalfOpen, true) => {
                inner.consecutive_successes = inner.consecutive_successes.saturating_add(1);
                if inner.consecutive_successes >= self.config.half_open_max_requests {
                    info!(instance = %self.name, "circuit breaker recovered, transitioning to Closed");
                    inner.set_state(BreakerState::Closed, &self.config, now);
                }
            }
            (BreakerState::HalfOpen, false) => {
                warn!(instance = %self.name, "trial call failed, transitioning back to Open");
                inner.set_state(BreakerState::Open, &self.config, now);
            }
            // Open admits nothing, so no result can belong to its generation.
            (BreakerState::Open, _) => {}
        }
    }

    fn refresh(&self, inner: &mut Inner, now: Instant) {
        if inner.state == BreakerState::Open && inner.reopen_at.is_some_and(|at| now >= at) {
            info!(instance = %self.name, "open timeout elapsed, transitioning to HalfOpen");
            inner.set_state(BreakerState::HalfOpen, &self.config, now);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission ticket for one call through a [`CircuitBreaker`].
#[must_use = "an unsettled permit is recorded as a failure"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Permit<'_> {
    /// Report how the admitted call went.
    pub fn record(mut self, success: bool) {
        self.settled = true;
        self.breaker.on_result(self.generation, success);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_result(self.generation, false);
        }
    }
}
