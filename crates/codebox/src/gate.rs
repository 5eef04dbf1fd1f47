//! Admission control
//!
//! Two independent limits guard every execution. The admission counter caps
//! how many requests are accepted at all and rejects the excess immediately.
//! The worker semaphore caps how many interpreter processes run at once;
//! admitted requests wait for a free worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("too many requests in flight (limit {limit})")]
    Overloaded { limit: usize },

    #[error("worker pool is closed")]
    Closed,
}

/// Process-wide concurrency limits
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    workers: Arc<Semaphore>,
    max_workers: usize,
    in_flight: Arc<AtomicUsize>,
    max_requests: usize,
}

/// Slot in the admission counter, released on drop
#[derive(Debug)]
pub struct Admission {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConcurrencyGate {
    pub fn new(max_workers: usize, max_requests: usize) -> Self {
        Self {
            workers: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_requests,
        }
    }

    /// Take an admission slot without waiting
    pub fn try_admit(&self) -> Result<Admission, GateError> {
        let max = self.max_requests;
        let admitted = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            });

        match admitted {
            Ok(previous) => {
                debug!(in_flight = previous + 1, "request admitted");
                Ok(Admission {
                    in_flight: self.in_flight.clone(),
                })
            }
            Err(_) => {
                warn!(limit = max, "rejecting request, too many in flight");
                Err(GateError::Overloaded { limit: max })
            }
        }
    }

    /// Wait for a worker slot
    pub async fn acquire_worker(&self) -> Result<OwnedSemaphorePermit, GateError> {
        self.workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateError::Closed)
    }

    /// Number of admitted requests
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of idle worker slots
    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }
}
