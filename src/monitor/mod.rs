//! Statement lifecycle events.
//!
//! Every statement reports to its server's [`Monitor`]: a start event before
//! dispatch, an execute event once the cursor is open and exactly one end
//! event when it is closed.

use crate::server::{Purpose, StatementLocus};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const MONITOR_LOG: &str = "rolap_sql::monitor";

/// Fields common to every statement event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventHeader {
    /// Wall-clock time of the event, in milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    pub statement_id: u64,
    pub execution_id: u64,
    pub component: String,
    pub sql: String,
    pub purpose: Purpose,
}

impl EventHeader {
    pub fn new(statement_id: u64, locus: &StatementLocus, sql: &str) -> Self {
        Self {
            timestamp_ms: now_millis(),
            statement_id,
            execution_id: locus.execution().id(),
            component: locus.component().to_string(),
            sql: sql.to_string(),
            purpose: locus.purpose(),
        }
    }
}

/// A statement lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SqlStatementEvent {
    /// Emitted right before the query is dispatched
    Start {
        #[serde(flatten)]
        header: EventHeader,
        cell_request_count: usize,
    },
    /// Emitted once the driver returned a cursor
    Execute {
        #[serde(flatten)]
        header: EventHeader,
        execute_nanos: u64,
    },
    /// Emitted once, on the first close
    End {
        #[serde(flatten)]
        header: EventHeader,
        row_count: u64,
        success: bool,
    },
}

impl SqlStatementEvent {
    pub fn header(&self) -> &EventHeader {
        match self {
            SqlStatementEvent::Start { header, .. }
            | SqlStatementEvent::Execute { header, .. }
            | SqlStatementEvent::End { header, .. } => header,
        }
    }

    pub fn statement_id(&self) -> u64 {
        self.header().statement_id
    }

    pub fn is_end(&self) -> bool {
        matches!(self, SqlStatementEvent::End { .. })
    }
}

/// Sink for statement events.
pub trait Monitor: Send + Sync {
    fn send_event(&self, event: SqlStatementEvent);
}

/// Monitor that logs every event through `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitor;

impl Monitor for TracingMonitor {
    fn send_event(&self, event: SqlStatementEvent) {
        match &event {
            SqlStatementEvent::Start {
                header,
                cell_request_count,
            } => debug!(
                target: MONITOR_LOG,
                statement_id = header.statement_id,
                execution_id = header.execution_id,
                component = %header.component,
                purpose = %header.purpose,
                cell_request_count,
                "statement start"
            ),
            SqlStatementEvent::Execute {
                header,
                execute_nanos,
            } => debug!(
                target: MONITOR_LOG,
                statement_id = header.statement_id,
                execute_nanos,
                "statement executed"
            ),
            SqlStatementEvent::End {
                header,
                row_count,
                success,
            } => debug!(
                target: MONITOR_LOG,
                statement_id = header.statement_id,
                row_count,
                success,
                "statement end"
            ),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
