//! Common test utilities for rolap-sql integration tests.
//!
//! Provides an in-memory fake of the native driver contract that records
//! every call it receives, and a monitor that keeps every event it is sent.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rolap_sql::driver::{
    CancelHandle, ColumnDescriptor, ConnectionSource, CursorKind, NativeConnection, NativeCursor,
    NativeStatement, SqlTypeCode,
};
use rolap_sql::error::DriverError;
use rolap_sql::monitor::{Monitor, SqlStatementEvent};
use rolap_sql::server::{Execution, Purpose, Server, StatementLocus};
use rolap_sql::EngineConfig;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Logging
// ============================================================================

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Fake database
// ============================================================================

/// Canned result and failure injection for the fake driver.
#[derive(Debug, Clone, Default)]
pub struct FakeDatabase {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<Value>>,
    pub fail_connect: Option<DriverError>,
    pub fail_execute: Option<DriverError>,
    pub fail_cursor_close: Option<DriverError>,
    pub fail_connection_close: Option<DriverError>,
    /// `next()` fails when advancing onto this one-based row
    pub fail_fetch_at: Option<usize>,
}

impl FakeDatabase {
    pub fn new(columns: Vec<ColumnDescriptor>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            ..Self::default()
        }
    }

    /// Three rows of (year INTEGER, city VARCHAR, m0 NUMBER).
    pub fn sales() -> Self {
        Self::new(
            vec![
                ColumnDescriptor::new("year", SqlTypeCode::Integer, "INTEGER"),
                ColumnDescriptor::new("city", SqlTypeCode::Varchar, "VARCHAR"),
                ColumnDescriptor::new("m0", SqlTypeCode::Numeric, "NUMBER"),
            ],
            vec![
                vec![json!(1997), json!("Seattle"), json!(120.5)],
                vec![json!(1997), json!("Portland"), json!(null)],
                vec![json!(null), json!(null), json!(7)],
            ],
        )
    }

    pub fn fail_connect(mut self, err: DriverError) -> Self {
        self.fail_connect = Some(err);
        self
    }

    pub fn fail_execute(mut self, err: DriverError) -> Self {
        self.fail_execute = Some(err);
        self
    }

    pub fn fail_cursor_close(mut self, err: DriverError) -> Self {
        self.fail_cursor_close = Some(err);
        self
    }

    pub fn fail_connection_close(mut self, err: DriverError) -> Self {
        self.fail_connection_close = Some(err);
        self
    }

    pub fn fail_fetch_at(mut self, row: usize) -> Self {
        self.fail_fetch_at = Some(row);
        self
    }
}

/// Counters of every call the fake driver received.
#[derive(Debug, Default)]
pub struct DriverStats {
    pub connections_opened: AtomicUsize,
    pub connections_closed: AtomicUsize,
    pub statements_created: AtomicUsize,
    pub statements_closed: AtomicUsize,
    pub cursors_closed: AtomicUsize,
    pub cancels: AtomicUsize,
    pub value_reads: AtomicUsize,
    pub max_rows: Mutex<Option<u64>>,
    pub cursor_kinds: Mutex<Vec<CursorKind>>,
    pub executed_sql: Mutex<Vec<String>>,
}

impl DriverStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn connections_open(&self) -> usize {
        Self::get(&self.connections_opened) - Self::get(&self.connections_closed)
    }
}

pub struct FakeSource {
    db: Arc<FakeDatabase>,
    stats: Arc<DriverStats>,
}

impl FakeSource {
    pub fn new(db: FakeDatabase) -> Arc<Self> {
        Arc::new(Self {
            db: Arc::new(db),
            stats: Arc::new(DriverStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<DriverStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl ConnectionSource for FakeSource {
    async fn get_connection(&self) -> Result<Box<dyn NativeConnection>, DriverError> {
        if let Some(err) = &self.db.fail_connect {
            return Err(err.clone());
        }
        self.stats.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            db: Arc::clone(&self.db),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct FakeConnection {
    db: Arc<FakeDatabase>,
    stats: Arc<DriverStats>,
}

#[async_trait]
impl NativeConnection for FakeConnection {
    async fn create_statement(
        &mut self,
        kind: CursorKind,
    ) -> Result<Box<dyn NativeStatement>, DriverError> {
        self.stats.statements_created.fetch_add(1, Ordering::SeqCst);
        self.stats.cursor_kinds.lock().push(kind);
        Ok(Box::new(FakeStatement {
            db: Arc::clone(&self.db),
            stats: Arc::clone(&self.stats),
            max_rows: None,
        }))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.stats.connections_closed.fetch_add(1, Ordering::SeqCst);
        match &self.db.fail_connection_close {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

struct FakeCancel {
    stats: Arc<DriverStats>,
}

impl CancelHandle for FakeCancel {
    fn cancel(&self) {
        self.stats.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeStatement {
    db: Arc<FakeDatabase>,
    stats: Arc<DriverStats>,
    max_rows: Option<u64>,
}

#[async_trait]
impl NativeStatement for FakeStatement {
    fn set_max_rows(&mut self, max_rows: u64) -> Result<(), DriverError> {
        self.max_rows = Some(max_rows);
        *self.stats.max_rows.lock() = Some(max_rows);
        Ok(())
    }

    fn cancel_handle(&self) -> Arc<dyn CancelHandle> {
        Arc::new(FakeCancel {
            stats: Arc::clone(&self.stats),
        })
    }

    async fn execute_query(&mut self, sql: &str) -> Result<Box<dyn NativeCursor>, DriverError> {
        self.stats.executed_sql.lock().push(sql.to_string());
        if let Some(err) = &self.db.fail_execute {
            return Err(err.clone());
        }

        let mut rows = self.db.rows.clone();
        if let Some(max_rows) = self.max_rows {
            rows.truncate(max_rows as usize);
        }
        Ok(Box::new(FakeCursor {
            db: Arc::clone(&self.db),
            stats: Arc::clone(&self.stats),
            rows,
            position: 0,
            last_null: false,
        }))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.stats.statements_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeCursor {
    db: Arc<FakeDatabase>,
    stats: Arc<DriverStats>,
    rows: Vec<Vec<Value>>,
    position: usize,
    last_null: bool,
}

impl FakeCursor {
    fn cell(&mut self, column: usize) -> Result<Value, DriverError> {
        self.stats.value_reads.fetch_add(1, Ordering::SeqCst);
        let value = self
            .position
            .checked_sub(1)
            .and_then(|i| self.rows.get(i))
            .and_then(|row| row.get(column))
            .cloned()
            .ok_or_else(|| DriverError::Cursor(format!("no value at column {}", column)))?;
        self.last_null = value.is_null();
        Ok(value)
    }
}

#[async_trait]
impl NativeCursor for FakeCursor {
    fn columns(&self) -> Result<Vec<ColumnDescriptor>, DriverError> {
        Ok(self.db.columns.clone())
    }

    async fn next(&mut self) -> Result<bool, DriverError> {
        if self.db.fail_fetch_at == Some(self.position + 1) {
            return Err(DriverError::Cursor("connection reset".to_string()));
        }
        if self.position < self.rows.len() {
            self.position += 1;
            Ok(true)
        } else {
            self.position = self.rows.len() + 1;
            Ok(false)
        }
    }

    async fn absolute(&mut self, row: u64) -> Result<bool, DriverError> {
        let row = row as usize;
        if row >= 1 && row <= self.rows.len() {
            self.position = row;
            Ok(true)
        } else {
            self.position = self.rows.len() + 1;
            Ok(false)
        }
    }

    fn get_int(&mut self, column: usize) -> Result<i32, DriverError> {
        Ok(self.cell(column)?.as_i64().unwrap_or(0) as i32)
    }

    fn get_long(&mut self, column: usize) -> Result<i64, DriverError> {
        Ok(self.cell(column)?.as_i64().unwrap_or(0))
    }

    fn get_double(&mut self, column: usize) -> Result<f64, DriverError> {
        Ok(self.cell(column)?.as_f64().unwrap_or(0.0))
    }

    fn get_string(&mut self, column: usize) -> Result<Option<String>, DriverError> {
        Ok(match self.cell(column)? {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    fn get_object(&mut self, column: usize) -> Result<Value, DriverError> {
        self.cell(column)
    }

    fn was_null(&self) -> bool {
        self.last_null
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.stats.cursors_closed.fetch_add(1, Ordering::SeqCst);
        match &self.db.fail_cursor_close {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Monitor that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    events: Mutex<Vec<SqlStatementEvent>>,
}

impl RecordingMonitor {
    pub fn events(&self) -> Vec<SqlStatementEvent> {
        self.events.lock().clone()
    }

    /// Event names for one statement, in order.
    pub fn kinds(&self, statement_id: u64) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.statement_id() == statement_id)
            .map(|e| match e {
                SqlStatementEvent::Start { .. } => "start",
                SqlStatementEvent::Execute { .. } => "execute",
                SqlStatementEvent::End { .. } => "end",
            })
            .collect()
    }

    /// `(row_count, success)` of every end event for one statement.
    pub fn ends(&self, statement_id: u64) -> Vec<(u64, bool)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SqlStatementEvent::End {
                    header,
                    row_count,
                    success,
                } if header.statement_id == statement_id => Some((*row_count, *success)),
                _ => None,
            })
            .collect()
    }
}

impl Monitor for RecordingMonitor {
    fn send_event(&self, event: SqlStatementEvent) {
        self.events.lock().push(event);
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A server with `query_limit` slots reporting to a recording monitor.
pub fn server_with_limit(query_limit: usize) -> (Arc<Server>, Arc<RecordingMonitor>) {
    init_tracing();
    let monitor = Arc::new(RecordingMonitor::default());
    let config = EngineConfig::builder()
        .query_limit(query_limit)
        .build()
        .expect("valid config");
    let server = Server::new("test", config, monitor.clone()).expect("server");
    (server, monitor)
}

pub fn locus(execution: &Arc<Execution>, purpose: Purpose) -> StatementLocus {
    StatementLocus::new(Arc::clone(execution), "Test.load", "Error while loading test data")
        .with_purpose(purpose)
}
