//! SQL statement lifecycle.
//!
//! A [`SqlStatement`] runs one query against a native driver under the
//! server's admission gate:
//!
//! 1. fail fast if the execution was cancelled or timed out
//! 2. obtain a connection
//! 3. wait for a gate slot
//! 4. create the native statement and register it for cancellation (or hand
//!    it to the caller's callback for cell-segment loads)
//! 5. emit the start event, dispatch, emit the execute event
//! 6. skip to the first requested row and build the column accessors
//!
//! Any failure on the way disposes everything acquired so far and is
//! returned as a [`SqlStatementError`]. [`close`](SqlStatement::close) is
//! idempotent: the slot is released once and the end event is sent once.
//!
//! # Example
//!
//! ```no_run
//! use rolap_sql::driver::ConnectionSource;
//! use rolap_sql::query::SqlStatement;
//! use rolap_sql::server::{Execution, Purpose, Server, StatementLocus};
//! use std::sync::Arc;
//!
//! # async fn example(source: Arc<dyn ConnectionSource>) -> Result<(), rolap_sql::error::SqlStatementError> {
//! let execution = Execution::new(Server::standalone());
//! let locus = StatementLocus::new(execution, "Segment.load", "Error while loading segment")
//!     .with_purpose(Purpose::Tuples);
//!
//! let mut statement = SqlStatement::builder(source, locus, "select count(*) from sales").build();
//! statement.execute().await?;
//! while statement.next().await? {
//!     let value = statement.value(0).await?;
//!     println!("{:?}", value);
//! }
//! statement.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::driver::{
    CancelHandle, ColumnDescriptor, ConnectionSource, CursorKind, NativeConnection, NativeCursor,
    NativeStatement,
};
use crate::error::{AdmissionError, DriverError, SqlStatementError, StatementFailure};
use crate::monitor::{EventHeader, SqlStatementEvent};
use crate::server::{GatePermit, StatementLocus};
use crate::types::{infer_column_types, CellValue, ColumnType, Dialect};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::accessor::AccessorTable;
use super::cursor::SqlCursor;

pub(crate) const SQL_LOG: &str = "rolap_sql::sql";

/// Receives the native statement of a cell-segment load so the caller can
/// cancel it directly.
pub type StatementCallback = Box<dyn FnOnce(Arc<dyn CancelHandle>) + Send>;

/// Lifecycle state of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementState {
    /// Created, not yet executed
    Fresh,
    /// Executed, rows may remain
    Active,
    /// Executed, no rows remain
    Done,
    /// Resources released
    Closed,
}

impl fmt::Display for StatementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementState::Fresh => write!(f, "FRESH"),
            StatementState::Active => write!(f, "ACTIVE"),
            StatementState::Done => write!(f, "DONE"),
            StatementState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Builder for [`SqlStatement`].
pub struct SqlStatementBuilder {
    source: Arc<dyn ConnectionSource>,
    locus: StatementLocus,
    sql: String,
    types: Option<Vec<Option<ColumnType>>>,
    max_rows: Option<u64>,
    first_row_ordinal: Option<u64>,
    cursor_kind: CursorKind,
    dialect: Option<Arc<dyn Dialect>>,
    callback: Option<StatementCallback>,
    caching: Option<bool>,
}

impl SqlStatementBuilder {
    /// Suggested column types. `None` entries are inferred.
    pub fn types(mut self, types: Vec<Option<ColumnType>>) -> Self {
        self.types = Some(types);
        self
    }

    /// Cap the number of rows returned. Values `<= 0` mean unbounded.
    pub fn max_rows(mut self, max_rows: i64) -> Self {
        self.max_rows = u64::try_from(max_rows).ok().filter(|n| *n > 0);
        self
    }

    /// Number of leading rows to skip. Values `<= 0` skip nothing.
    pub fn first_row_ordinal(mut self, ordinal: i64) -> Self {
        self.first_row_ordinal = u64::try_from(ordinal).ok().filter(|n| *n > 0);
        self
    }

    /// Cursor kind requested from the driver. Defaults to forward-only.
    pub fn cursor_kind(mut self, kind: CursorKind) -> Self {
        self.cursor_kind = kind;
        self
    }

    /// Dialect used to infer column types. Defaults to
    /// [`GenericDialect`](crate::types::GenericDialect).
    pub fn dialect(mut self, dialect: Arc<dyn Dialect>) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Callback that receives the native statement of a cell-segment load.
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Arc<dyn CancelHandle>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Override the server's accessor caching setting.
    pub fn caching(mut self, enabled: bool) -> Self {
        self.caching = Some(enabled);
        self
    }

    /// Allocate a statement id from the server and build a fresh statement.
    pub fn build(self) -> SqlStatement {
        let server = self.locus.server();
        let id = server.next_statement_id();
        let caching = self
            .caching
            .unwrap_or_else(|| server.config().cache_accessors);

        SqlStatement {
            id,
            source: self.source,
            locus: self.locus,
            sql: self.sql,
            types: self.types,
            max_rows: self.max_rows,
            first_row_ordinal: self.first_row_ordinal,
            cursor_kind: self.cursor_kind,
            dialect: self.dialect,
            callback: self.callback,
            caching,
            state: StatementState::Fresh,
            permit: None,
            connection: None,
            statement: None,
            cursor: None,
            registered: None,
            columns: Vec::new(),
            accessors: AccessorTable::default(),
            row_count: 0,
            started: None,
            failure: None,
        }
    }
}

/// One SQL query and its native resources.
pub struct SqlStatement {
    id: u64,
    source: Arc<dyn ConnectionSource>,
    locus: StatementLocus,
    sql: String,
    types: Option<Vec<Option<ColumnType>>>,
    max_rows: Option<u64>,
    first_row_ordinal: Option<u64>,
    cursor_kind: CursorKind,
    dialect: Option<Arc<dyn Dialect>>,
    callback: Option<StatementCallback>,
    caching: bool,

    state: StatementState,
    permit: Option<GatePermit>,
    connection: Option<Box<dyn NativeConnection>>,
    statement: Option<Box<dyn NativeStatement>>,
    cursor: Option<Box<dyn NativeCursor>>,
    registered: Option<Arc<dyn CancelHandle>>,
    columns: Vec<ColumnDescriptor>,
    accessors: AccessorTable,
    row_count: u64,
    started: Option<Instant>,
    failure: Option<String>,
}

impl SqlStatement {
    /// Start building a statement.
    ///
    /// # Arguments
    /// * `source` - Where connections come from
    /// * `locus` - Execution context, component and purpose
    /// * `sql` - Query text
    pub fn builder(
        source: Arc<dyn ConnectionSource>,
        locus: StatementLocus,
        sql: impl Into<String>,
    ) -> SqlStatementBuilder {
        SqlStatementBuilder {
            source,
            locus,
            sql: sql.into(),
            types: None,
            max_rows: None,
            first_row_ordinal: None,
            cursor_kind: CursorKind::ForwardOnly,
            dialect: None,
            callback: None,
            caching: None,
        }
    }

    /// Execute the query.
    ///
    /// On success the statement is `Active`, or `Done` if skipping to the
    /// first requested row exhausted the result. On failure every resource
    /// acquired so far is released and the statement is `Closed`.
    ///
    /// # Errors
    /// - `IllegalReExecution` if the statement is not fresh
    /// - `PostCloseUse` if the statement was closed
    /// - `AdmissionTimeout` if cancelled or timed out before dispatch
    /// - `ConnectionFailure`, `ExecutionFailure` or `FetchFailure` from the driver
    /// - `ContractViolation` if the suggested types do not match the columns
    pub async fn execute(&mut self) -> Result<(), SqlStatementError> {
        match self.state {
            StatementState::Fresh => {}
            StatementState::Closed => return Err(self.error(StatementFailure::PostCloseUse)),
            state => return Err(self.error(StatementFailure::IllegalReExecution(state))),
        }

        self.state = StatementState::Active;
        self.locus.server().counters().record_execute(self.id);
        self.started = Some(Instant::now());

        match self.run().await {
            Ok(()) => Ok(()),
            Err(failure) => Err(self.fail(failure).await),
        }
    }

    async fn run(&mut self) -> Result<(), StatementFailure> {
        let execution = Arc::clone(self.locus.execution());
        execution
            .check_cancel_or_timeout()
            .map_err(AdmissionError::from)?;

        let connection = self
            .source
            .get_connection()
            .await
            .map_err(StatementFailure::Connection)?;
        self.connection = Some(connection);

        let permit = execution.server().gate().acquire(&execution).await?;
        self.permit = Some(permit);

        debug!(
            target: SQL_LOG,
            "{}: {}: executing sql [{}{}]",
            self.id,
            self.locus.component(),
            if self.sql.contains('\n') { "\n" } else { "" },
            self.sql
        );

        let kind = self.cursor_kind;
        let created = match self.connection.as_mut() {
            Some(connection) => connection.create_statement(kind).await,
            None => Err(DriverError::Closed),
        };
        let statement = self
            .statement
            .insert(created.map_err(StatementFailure::Execution)?);
        if let Some(max_rows) = self.max_rows {
            statement
                .set_max_rows(max_rows)
                .map_err(StatementFailure::Execution)?;
        }

        let handle = statement.cancel_handle();
        if self.locus.purpose().is_sub_fetch() {
            if let Some(callback) = self.callback.take() {
                callback(handle);
            }
        } else {
            execution.register_statement(Arc::clone(&handle));
            self.registered = Some(handle);
        }

        self.send_event(SqlStatementEvent::Start {
            header: self.event_header(),
            cell_request_count: self.locus.cell_request_count(),
        });

        let dispatched = Instant::now();
        let cursor = match self.statement.as_mut() {
            Some(statement) => statement.execute_query(&self.sql).await,
            None => Err(DriverError::Closed),
        };
        self.cursor = Some(cursor.map_err(StatementFailure::Execution)?);
        let execute_nanos = dispatched.elapsed().as_nanos() as u64;

        execution
            .check_cancel_or_timeout()
            .map_err(AdmissionError::from)?;

        self.send_event(SqlStatementEvent::Execute {
            header: self.event_header(),
            execute_nanos,
        });
        debug!(
            target: SQL_LOG,
            "{}: , exec {} ms",
            self.id,
            execute_nanos / 1_000_000
        );

        let cursor = match self.cursor.as_mut() {
            Some(cursor) => cursor,
            None => return Err(StatementFailure::Fetch(DriverError::Closed)),
        };

        if let Some(first_row) = self.first_row_ordinal {
            let positioned = match self.cursor_kind {
                CursorKind::ForwardOnly => {
                    let mut positioned = true;
                    for _ in 0..first_row {
                        if !cursor.next().await.map_err(StatementFailure::Fetch)? {
                            positioned = false;
                            break;
                        }
                    }
                    positioned
                }
                CursorKind::Scrollable => cursor
                    .absolute(first_row)
                    .await
                    .map_err(StatementFailure::Fetch)?,
            };
            if !positioned {
                self.state = StatementState::Done;
            }
        }

        let columns = cursor.columns().map_err(StatementFailure::Fetch)?;
        let types = infer_column_types(self.types.as_deref(), &columns, self.dialect.as_deref())?;
        self.accessors = AccessorTable::new(&types, self.caching);
        self.columns = columns;

        Ok(())
    }

    /// Advance to the next row.
    ///
    /// Returns `false` once the result is exhausted. The row counter only
    /// moves when a row is actually read.
    ///
    /// # Errors
    /// `PostCloseUse` after close, `FetchFailure` if the driver fails. A
    /// driver failure closes the statement.
    pub async fn next(&mut self) -> Result<bool, SqlStatementError> {
        match self.state {
            StatementState::Active => {}
            StatementState::Done => return Ok(false),
            StatementState::Closed => return Err(self.error(StatementFailure::PostCloseUse)),
            StatementState::Fresh => {
                return Err(self.error(StatementFailure::ContractViolation(
                    "statement has not been executed".to_string(),
                )))
            }
        }

        let advanced = match self.cursor.as_mut() {
            Some(cursor) => cursor.next().await,
            None => Err(DriverError::Closed),
        };
        match advanced {
            Ok(true) => {
                self.row_count += 1;
                Ok(true)
            }
            Ok(false) => {
                self.state = StatementState::Done;
                Ok(false)
            }
            Err(e) => Err(self.fail(StatementFailure::Fetch(e)).await),
        }
    }

    /// Value of column `ordinal` (zero-based) in the current row.
    ///
    /// # Errors
    /// `PostCloseUse` after close, `ContractViolation` for an unknown
    /// ordinal, `FetchFailure` if the driver fails. A driver failure closes
    /// the statement.
    pub async fn value(&mut self, ordinal: usize) -> Result<CellValue, SqlStatementError> {
        if self.state == StatementState::Closed {
            return Err(self.error(StatementFailure::PostCloseUse));
        }

        if ordinal >= self.accessors.len() {
            return Err(self.error(StatementFailure::ContractViolation(format!(
                "no column at ordinal {}",
                ordinal
            ))));
        }

        let row = self.row_count;
        let read = match (self.accessors.get_mut(ordinal), self.cursor.as_deref_mut()) {
            (Some(accessor), Some(cursor)) => accessor.get(cursor, row),
            _ => Err(DriverError::Closed),
        };

        match read {
            Ok(value) => Ok(value),
            Err(e) => Err(self.fail(StatementFailure::Fetch(e)).await),
        }
    }

    /// Values of every column in the current row.
    pub async fn row_values(&mut self) -> Result<Vec<CellValue>, SqlStatementError> {
        let mut values = Vec::with_capacity(self.accessors.len());
        for ordinal in 0..self.accessors.len() {
            values.push(self.value(ordinal).await?);
        }
        Ok(values)
    }

    /// Wrap a driver failure hit while using this statement's cursor
    /// directly, and close the statement.
    pub async fn handle(&mut self, cause: DriverError) -> SqlStatementError {
        self.fail(StatementFailure::Fetch(cause)).await
    }

    /// Release every resource and emit the end event.
    ///
    /// Idempotent: only the first call releases the gate slot, records
    /// timings and emits the end event.
    ///
    /// # Errors
    /// `DisposalFailure` if closing a native resource failed. The end event
    /// has already been emitted and the slot released in that case.
    pub async fn close(&mut self) -> Result<(), SqlStatementError> {
        if self.state == StatementState::Closed {
            return Ok(());
        }
        let executed = self.state != StatementState::Fresh;
        self.state = StatementState::Closed;

        if let Some(permit) = self.permit.take() {
            permit.release();
        }
        if let Some(handle) = self.registered.take() {
            self.locus.execution().unregister_statement(&handle);
        }

        let mut failures = self.dispose().await;

        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        if executed {
            let execution = self.locus.execution();
            execution.record_timing(&format!("SqlStatement-{}", self.locus.component()), elapsed);
            self.locus.server().counters().record_close(self.id);
        }
        debug!(
            target: SQL_LOG,
            "{}: , exec+fetch {} ms, {} rows",
            self.id,
            elapsed.as_millis(),
            self.row_count
        );

        self.send_event(SqlStatementEvent::End {
            header: self.event_header(),
            row_count: self.row_count,
            success: self.failure.is_none() && failures.is_empty(),
        });

        if failures.is_empty() {
            return Ok(());
        }
        let first = failures.remove(0);
        Err(self
            .error(StatementFailure::Disposal(first))
            .with_suppressed(failures))
    }

    async fn dispose(&mut self) -> Vec<DriverError> {
        let mut failures = Vec::new();
        if let Some(mut cursor) = self.cursor.take() {
            if let Err(e) = cursor.close().await {
                failures.push(e);
            }
        }
        if let Some(mut statement) = self.statement.take() {
            if let Err(e) = statement.close().await {
                failures.push(e);
            }
        }
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                failures.push(e);
            }
        }
        if !failures.is_empty() {
            warn!(
                target: SQL_LOG,
                statement_id = self.id,
                failures = failures.len(),
                "failed to release statement resources"
            );
        }
        failures
    }

    /// Record `failure`, close the statement and return the normalized error.
    /// Disposal failures are attached to the error, never substituted for it.
    pub(crate) async fn fail(&mut self, failure: StatementFailure) -> SqlStatementError {
        debug!(target: SQL_LOG, "{}: , failed ({})", self.id, failure);
        self.failure = Some(failure.to_string());

        let error = self.error(failure);
        match self.close().await {
            Ok(()) => error,
            Err(close_error) => error.with_suppressed(close_error.into_disposal_failures()),
        }
    }

    pub(crate) fn error(&self, failure: StatementFailure) -> SqlStatementError {
        SqlStatementError::new(self.id, self.sql.as_str(), self.locus.message(), failure)
    }

    fn event_header(&self) -> EventHeader {
        EventHeader::new(self.id, &self.locus, &self.sql)
    }

    fn send_event(&self, event: SqlStatementEvent) {
        self.locus.server().monitor().send_event(event);
    }

    /// Turn the statement into a cursor that owns it.
    pub fn into_cursor(self) -> SqlCursor {
        SqlCursor::new(self)
    }

    /// Server-unique statement id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Where this statement runs and what it loads.
    pub fn locus(&self) -> &StatementLocus {
        &self.locus
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == StatementState::Closed
    }

    /// Whether this statement currently holds a gate slot.
    pub fn holds_permit(&self) -> bool {
        self.permit.is_some()
    }

    /// Number of rows advanced through [`next`](Self::next) or reported
    /// with [`record_row`](Self::record_row).
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Inferred column types. Empty before execution.
    pub fn column_types(&self) -> Vec<ColumnType> {
        self.accessors.column_types()
    }

    /// Column metadata. Empty before execution.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// The native cursor, for callers that read rows themselves.
    ///
    /// Such callers must call [`record_row`](Self::record_row) after every
    /// successful advance. Cached accessors key on the row counter and
    /// return stale values otherwise.
    pub fn native_cursor(&mut self) -> Option<&mut (dyn NativeCursor + 'static)> {
        self.cursor.as_deref_mut()
    }

    /// Count a row advanced on the [`native_cursor`](Self::native_cursor).
    ///
    /// Ignored unless the statement is active.
    pub fn record_row(&mut self) {
        if self.state == StatementState::Active {
            self.row_count += 1;
        }
    }
}

impl Drop for SqlStatement {
    fn drop(&mut self) {
        if matches!(self.state, StatementState::Active | StatementState::Done) {
            warn!(
                target: SQL_LOG,
                statement_id = self.id,
                sql = %self.sql,
                "statement dropped without close"
            );
            self.locus.server().counters().record_close(self.id);
        }
        if let Some(handle) = self.registered.take() {
            self.locus.execution().unregister_statement(&handle);
        }
    }
}

impl fmt::Debug for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlStatement")
            .field("id", &self.id)
            .field("sql", &self.sql)
            .field("state", &self.state)
            .field("purpose", &self.locus.purpose())
            .field("row_count", &self.row_count)
            .finish()
    }
}
