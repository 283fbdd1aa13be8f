//! Query admission gate.
//!
//! A fair counting semaphore that caps how many statements may hold a native
//! statement open at once. Waiters are admitted in arrival order. A waiter
//! gives up when its execution is cancelled or times out, or when the
//! optional admission timeout elapses.

use crate::error::AdmissionError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use super::execution::Execution;

/// Fair admission gate with a fixed number of slots.
pub struct QueryGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    admission_timeout: Option<Duration>,
}

impl QueryGate {
    /// Create a gate with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            admission_timeout: None,
        }
    }

    /// Give up waiting for a slot after `timeout`.
    pub fn with_admission_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.admission_timeout = timeout;
        self
    }

    /// Wait for a slot.
    ///
    /// # Errors
    /// - `AdmissionError::Interrupted` if the execution is cancelled or times
    ///   out before a slot is granted
    /// - `AdmissionError::QueueTimeout` if the admission timeout elapses
    /// - `AdmissionError::GateClosed` if the gate was shut down
    pub async fn acquire(&self, execution: &Execution) -> Result<GatePermit, AdmissionError> {
        execution.check_cancel_or_timeout()?;

        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        let limit = self.admission_timeout;
        let queue_timeout = async move {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let permit = tokio::select! {
            biased;
            permit = acquire => permit.map_err(|_| AdmissionError::GateClosed)?,
            interrupt = execution.interrupted() => return Err(interrupt.into()),
            _ = queue_timeout => {
                return Err(AdmissionError::QueueTimeout {
                    timeout_ms: limit.map(|l| l.as_millis() as u64).unwrap_or(0),
                });
            }
        };

        trace!(
            execution_id = execution.id(),
            available = self.semaphore.available_permits(),
            "query slot acquired"
        );
        Ok(GatePermit { _permit: permit })
    }

    /// Number of free slots.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available_permits())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Close the gate. Current waiters and future acquires fail with
    /// `AdmissionError::GateClosed`; held permits stay valid.
    pub fn shutdown(&self) {
        self.semaphore.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.semaphore.is_closed()
    }
}

impl fmt::Debug for QueryGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryGate")
            .field("capacity", &self.capacity)
            .field("available", &self.available_permits())
            .field("admission_timeout", &self.admission_timeout)
            .finish()
    }
}

/// A held slot. The slot is returned when the permit is released or dropped.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl GatePermit {
    /// Return the slot to the gate.
    pub fn release(self) {
        drop(self);
    }
}
