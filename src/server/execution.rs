//! Execution context shared by the statements of one query.
//!
//! An [`Execution`] owns the query's cancellation flag, its optional deadline,
//! the cancel handles of its in-flight native statements and a timing ledger.
//! A [`StatementLocus`] ties a single statement to its execution with a
//! component name, an error message prefix and a purpose.

use crate::driver::CancelHandle;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use super::instance::Server;

/// Why an execution stopped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The execution was cancelled
    #[error("Query cancelled")]
    Cancelled,

    /// The execution's deadline passed
    #[error("Query timeout after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

/// What a statement is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Purpose {
    /// Sub-fetch loading a cell segment. The caller's callback receives the
    /// native statement instead of registering it with the execution.
    CellSegment,
    DrillThrough,
    Tuples,
    Other,
}

impl Purpose {
    pub fn is_sub_fetch(&self) -> bool {
        matches!(self, Purpose::CellSegment)
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Purpose::CellSegment => write!(f, "CELL_SEGMENT"),
            Purpose::DrillThrough => write!(f, "DRILL_THROUGH"),
            Purpose::Tuples => write!(f, "TUPLES"),
            Purpose::Other => write!(f, "OTHER"),
        }
    }
}

/// Execution context for one query.
pub struct Execution {
    id: u64,
    server: Arc<Server>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    cancelled: watch::Sender<bool>,
    statements: Mutex<Vec<Arc<dyn CancelHandle>>>,
    timings: Mutex<BTreeMap<String, Duration>>,
}

impl Execution {
    /// Create an execution with no deadline.
    pub fn new(server: Arc<Server>) -> Arc<Self> {
        Self::create(server, None)
    }

    /// Create an execution that times out `timeout` from now.
    pub fn with_timeout(server: Arc<Server>, timeout: Duration) -> Arc<Self> {
        Self::create(server, Some(timeout))
    }

    fn create(server: Arc<Server>, timeout: Option<Duration>) -> Arc<Self> {
        let (cancelled, _) = watch::channel(false);
        Arc::new(Self {
            id: server.next_execution_id(),
            server,
            timeout,
            deadline: timeout.map(|t| Instant::now() + t),
            cancelled,
            statements: Mutex::new(Vec::new()),
            timings: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The server this execution runs on.
    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Cancel the execution and interrupt every registered native statement.
    pub fn cancel(&self) {
        let already = self.cancelled.send_replace(true);
        if already {
            return;
        }

        let statements = self.statements.lock().clone();
        debug!(
            execution_id = self.id,
            statements = statements.len(),
            "cancelling execution"
        );
        for statement in statements {
            statement.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Check whether the execution was cancelled or ran past its deadline.
    ///
    /// # Errors
    /// Returns the [`Interrupt`] that stopped the execution.
    pub fn check_cancel_or_timeout(&self) -> Result<(), Interrupt> {
        if self.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(self.timed_out()),
            _ => Ok(()),
        }
    }

    /// Resolves when the execution is cancelled or its deadline passes.
    pub async fn interrupted(&self) -> Interrupt {
        let mut cancelled = self.cancelled.subscribe();
        let cancel = async move {
            let sender_gone = cancelled.wait_for(|c| *c).await.is_err();
            if sender_gone {
                std::future::pending::<()>().await;
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = cancel => Interrupt::Cancelled,
                _ = tokio::time::sleep_until(deadline) => self.timed_out(),
            },
            None => {
                cancel.await;
                Interrupt::Cancelled
            }
        }
    }

    /// Register an in-flight native statement so cancellation can reach it.
    ///
    /// A statement registered after cancellation is interrupted immediately.
    pub fn register_statement(&self, statement: Arc<dyn CancelHandle>) {
        self.statements.lock().push(Arc::clone(&statement));
        if self.is_cancelled() {
            statement.cancel();
        }
    }

    /// Remove a previously registered native statement.
    pub fn unregister_statement(&self, statement: &Arc<dyn CancelHandle>) {
        self.statements.lock().retain(|s| !Arc::ptr_eq(s, statement));
    }

    pub fn registered_statement_count(&self) -> usize {
        self.statements.lock().len()
    }

    /// Add `elapsed` to the timing bucket `name`.
    pub fn record_timing(&self, name: &str, elapsed: Duration) {
        *self.timings.lock().entry(name.to_string()).or_default() += elapsed;
    }

    pub fn timing(&self, name: &str) -> Option<Duration> {
        self.timings.lock().get(name).copied()
    }

    /// Snapshot of all timing buckets.
    pub fn timings(&self) -> BTreeMap<String, Duration> {
        self.timings.lock().clone()
    }

    fn timed_out(&self) -> Interrupt {
        Interrupt::TimedOut {
            timeout_ms: self.timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
        }
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("id", &self.id)
            .field("server", &self.server.id())
            .field("timeout", &self.timeout)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Where a statement runs and what it is for.
#[derive(Debug, Clone)]
pub struct StatementLocus {
    execution: Arc<Execution>,
    component: String,
    message: String,
    purpose: Purpose,
    cell_request_count: usize,
}

impl StatementLocus {
    /// Create a locus with purpose [`Purpose::Other`].
    ///
    /// # Arguments
    /// * `execution` - The execution the statement belongs to
    /// * `component` - Name of the issuing component, used in logs and timings
    /// * `message` - Prefix for error messages
    pub fn new(
        execution: Arc<Execution>,
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            execution,
            component: component.into(),
            message: message.into(),
            purpose: Purpose::Other,
            cell_request_count: 0,
        }
    }

    pub fn with_purpose(mut self, purpose: Purpose) -> Self {
        self.purpose = purpose;
        self
    }

    pub fn with_cell_request_count(mut self, count: usize) -> Self {
        self.cell_request_count = count;
        self
    }

    pub fn execution(&self) -> &Arc<Execution> {
        &self.execution
    }

    pub fn server(&self) -> &Arc<Server> {
        self.execution.server()
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    pub fn cell_request_count(&self) -> usize {
        self.cell_request_count
    }
}
