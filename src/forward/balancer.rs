//! Round-robin selection over a fixed set of endpoints.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{Endpoint, ForwardError};

pub struct RoundRobin {
    endpoints: Vec<Arc<dyn Endpoint>>,
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new(endpoints: Vec<Arc<dyn Endpoint>>) -> Self {
        Self {
            endpoints,
            next: AtomicUsize::new(0),
        }
    }

    /// The next endpoint in rotation. Unhealthy endpoints are not skipped;
    /// their failure is the caller's to handle.
    pub fn pick(&self) -> Result<Arc<dyn Endpoint>, ForwardError> {
        if self.endpoints.is_empty() {
            return Err(ForwardError::NoEndpoints);
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        Ok(Arc::clone(&self.endpoints[idx]))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
