//! Error types for rolap-sql.
//!
//! Failures are layered by where they come from:
//! - [`DriverError`] is what the native driver reports,
//! - [`StatementFailure`] classifies a failure by the lifecycle phase it hit,
//! - [`SqlStatementError`] is the normalized error handed back to callers. It
//!   carries the statement identity, the SQL text, the execution context's
//!   message and any disposal failures that happened while cleaning up.

use crate::query::StatementState;
use crate::server::Interrupt;
use std::fmt;
use thiserror::Error;

/// Errors reported by the native driver (pool, connection, statement, cursor).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// The pool or driver could not produce a usable connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// The database rejected or failed the dispatched query
    #[error("SQL error: {0}")]
    Sql(String),

    /// Advancing the cursor or reading a column failed
    #[error("Cursor error: {0}")]
    Cursor(String),

    /// The driver does not support the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The native resource was already closed
    #[error("Resource is closed")]
    Closed,

    /// The query was interrupted through its cancel handle
    #[error("Query was cancelled")]
    Cancelled,
}

/// Errors raised while waiting for admission through the query gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// The execution was cancelled or hit its deadline
    #[error(transparent)]
    Interrupted(#[from] Interrupt),

    /// The configured admission timeout elapsed before a slot became free
    #[error("Timed out after {timeout_ms}ms waiting for a query slot")]
    QueueTimeout { timeout_ms: u64 },

    /// The gate was shut down
    #[error("Query gate is shut down")]
    GateClosed,
}

/// Errors related to arrow batch materialisation.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// A cell did not match the column's inferred type
    #[error("Failed to convert value at row {row}, column {column}: {message}")]
    ValueConversionFailed {
        row: usize,
        column: usize,
        message: String,
    },

    /// Arrow error
    #[error("Arrow error: {0}")]
    ArrowError(String),
}

/// Errors related to engine configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Configuration document could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Errors related to the server registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No server with this instance id is registered
    #[error("No server instance has id '{0}'")]
    UnknownServer(String),

    /// A server with this instance id is already registered
    #[error("Server instance '{0}' is already registered")]
    DuplicateServer(String),
}

/// What went wrong during one statement's lifecycle.
#[derive(Error, Debug)]
pub enum StatementFailure {
    /// Cancellation, timeout or gate shutdown before (or right after) dispatch
    #[error("Admission failed: {0}")]
    Admission(#[from] AdmissionError),

    /// The pool failed to produce a connection
    #[error("Failed to obtain connection: {0}")]
    Connection(#[source] DriverError),

    /// The driver rejected the dispatched query
    #[error("Query execution failed: {0}")]
    Execution(#[source] DriverError),

    /// Advancing the cursor or reading a column failed
    #[error("Fetch failed: {0}")]
    Fetch(#[source] DriverError),

    /// Batch materialisation failed
    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    /// `execute()` called on a statement that is not fresh
    #[error("Cannot re-execute statement in state {0}")]
    IllegalReExecution(StatementState),

    /// Operation attempted on a closed statement
    #[error("Statement is closed")]
    PostCloseUse,

    /// The caller broke the statement's usage contract
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Releasing a native resource failed
    #[error("Failed to release resources: {0}")]
    Disposal(#[source] DriverError),
}

/// Flat classification of statement failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Cancellation or timeout fired while waiting or before dispatch
    AdmissionTimeout,
    /// No usable connection
    ConnectionFailure,
    /// Query rejected or failed by the driver
    ExecutionFailure,
    /// Cursor advance or column read failed
    FetchFailure,
    /// Statement executed twice
    IllegalReExecution,
    /// Statement used after close
    PostCloseUse,
    /// Caller broke the usage contract
    ContractViolation,
    /// Resource release failed
    DisposalFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::AdmissionTimeout => write!(f, "ADMISSION_TIMEOUT"),
            ErrorKind::ConnectionFailure => write!(f, "CONNECTION_FAILURE"),
            ErrorKind::ExecutionFailure => write!(f, "EXECUTION_FAILURE"),
            ErrorKind::FetchFailure => write!(f, "FETCH_FAILURE"),
            ErrorKind::IllegalReExecution => write!(f, "ILLEGAL_RE_EXECUTION"),
            ErrorKind::PostCloseUse => write!(f, "POST_CLOSE_USE"),
            ErrorKind::ContractViolation => write!(f, "CONTRACT_VIOLATION"),
            ErrorKind::DisposalFailure => write!(f, "DISPOSAL_FAILURE"),
        }
    }
}

impl StatementFailure {
    /// Map to the flat error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StatementFailure::Admission(_) => ErrorKind::AdmissionTimeout,
            StatementFailure::Connection(_) => ErrorKind::ConnectionFailure,
            StatementFailure::Execution(_) => ErrorKind::ExecutionFailure,
            StatementFailure::Fetch(_) | StatementFailure::Conversion(_) => ErrorKind::FetchFailure,
            StatementFailure::IllegalReExecution(_) => ErrorKind::IllegalReExecution,
            StatementFailure::PostCloseUse => ErrorKind::PostCloseUse,
            StatementFailure::ContractViolation(_) => ErrorKind::ContractViolation,
            StatementFailure::Disposal(_) => ErrorKind::DisposalFailure,
        }
    }
}

/// Normalized error surfaced by every [`SqlStatement`](crate::query::SqlStatement) operation.
///
/// The original failure is the error source. Failures hit while disposing
/// resources on the way out are kept in [`suppressed`](Self::suppressed) and
/// never replace the original failure.
#[derive(Error, Debug)]
#[error("{message}; sql=[{sql}]")]
pub struct SqlStatementError {
    statement_id: u64,
    sql: String,
    message: String,
    #[source]
    failure: StatementFailure,
    suppressed: Vec<DriverError>,
}

impl SqlStatementError {
    /// Create a normalized error for a statement.
    pub fn new(
        statement_id: u64,
        sql: impl Into<String>,
        message: impl Into<String>,
        failure: StatementFailure,
    ) -> Self {
        Self {
            statement_id,
            sql: sql.into(),
            message: message.into(),
            failure,
            suppressed: Vec::new(),
        }
    }

    /// Flat error kind of the original failure.
    pub fn kind(&self) -> ErrorKind {
        self.failure.kind()
    }

    /// The original failure.
    pub fn failure(&self) -> &StatementFailure {
        &self.failure
    }

    /// Id of the statement that failed.
    pub fn statement_id(&self) -> u64 {
        self.statement_id
    }

    /// SQL text of the statement that failed.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Message of the execution context the statement ran in.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Disposal failures that happened after the original failure.
    pub fn suppressed(&self) -> &[DriverError] {
        &self.suppressed
    }

    pub(crate) fn with_suppressed(mut self, suppressed: Vec<DriverError>) -> Self {
        self.suppressed.extend(suppressed);
        self
    }

    /// Every driver-level disposal failure this error carries, including the
    /// failure itself when it is a disposal failure.
    pub(crate) fn into_disposal_failures(self) -> Vec<DriverError> {
        let mut failures = Vec::with_capacity(self.suppressed.len() + 1);
        if let StatementFailure::Disposal(cause) = self.failure {
            failures.push(cause);
        }
        failures.extend(self.suppressed);
        failures
    }
}

// Conversions from external error types
impl From<arrow::error::ArrowError> for ConversionError {
    fn from(err: arrow::error::ArrowError) -> Self {
        ConversionError::ArrowError(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
