//! Bounded retry over a [`RoundRobin`]: a fixed number of attempts within one
//! wall-clock deadline.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::balancer::RoundRobin;
use super::ForwardError;
use crate::record::ExecutionRecord;

pub struct Retry {
    balancer: RoundRobin,
    max_attempts: usize,
    deadline: Duration,
}

impl Retry {
    pub fn new(balancer: RoundRobin, max_attempts: usize, deadline: Duration) -> Self {
        Self {
            balancer,
            max_attempts,
            deadline,
        }
    }

    /// Deliver `record`, each attempt going to the next endpoint in rotation.
    ///
    /// The deadline is measured from the first attempt. An attempt still in
    /// flight when it passes is dropped, which aborts its request. A permanent
    /// rejection ends the loop at once.
    pub async fn call(&self, record: &ExecutionRecord) -> Result<(), ForwardError> {
        let deadline = Instant::now() + self.deadline;
        let mut last = None;
        let mut attempts = 0;

        while attempts < self.max_attempts {
            attempts += 1;
            let endpoint = self.balancer.pick()?;

            match tokio::time::timeout_at(deadline, endpoint.call(record)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) if e.is_permanent() => {
                    debug!(attempt = attempts, error = %e, "record rejected, not retrying");
                    last = Some(e);
                    break;
                }
                Ok(Err(e)) => {
                    debug!(attempt = attempts, error = %e, "forward attempt failed");
                    last = Some(e);
                }
                Err(_) => {
                    debug!(attempt = attempts, "forward deadline exceeded mid-attempt");
                    last = Some(ForwardError::DeadlineExceeded(self.deadline));
                    break;
                }
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        Err(ForwardError::RetryExhausted {
            attempts,
            last: Box::new(last.unwrap_or(ForwardError::DeadlineExceeded(self.deadline))),
        })
    }
}
