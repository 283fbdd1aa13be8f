//! Native driver abstraction traits.
//!
//! These traits are the seam between the statement engine and whatever
//! actually talks to the database. A pool hands out connections, connections
//! create statements, statements dispatch SQL and return cursors.

use crate::error::DriverError;
use async_trait::async_trait;
use serde_json::Value;

use super::metadata::{ColumnDescriptor, CursorKind};

/// Source of native connections, typically a connection pool.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    /// Obtain a connection.
    ///
    /// # Errors
    /// Returns `DriverError` if no usable connection can be produced.
    async fn get_connection(&self) -> Result<Box<dyn NativeConnection>, DriverError>;
}

/// A native database connection.
#[async_trait]
pub trait NativeConnection: Send {
    /// Create a statement with the requested cursor navigation mode.
    ///
    /// # Errors
    /// Returns `DriverError` if the statement cannot be created.
    async fn create_statement(
        &mut self,
        kind: CursorKind,
    ) -> Result<Box<dyn NativeStatement>, DriverError>;

    /// Close (or return to the pool) this connection.
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Out-of-band interrupt for an in-flight native statement.
///
/// Handles are shared with the execution context so a cancellation can reach
/// the driver while the statement is still running.
pub trait CancelHandle: Send + Sync {
    /// Ask the driver to abort the statement. Must be safe to call at any
    /// time, including after the statement completed.
    fn cancel(&self);
}

/// A native statement.
#[async_trait]
pub trait NativeStatement: Send {
    /// Cap the number of rows the cursor will return.
    fn set_max_rows(&mut self, max_rows: u64) -> Result<(), DriverError>;

    /// Handle that can interrupt this statement from another task.
    fn cancel_handle(&self) -> std::sync::Arc<dyn CancelHandle>;

    /// Dispatch a query and return its cursor.
    ///
    /// # Errors
    /// Returns `DriverError` if the database rejects or fails the query.
    async fn execute_query(&mut self, sql: &str) -> Result<Box<dyn NativeCursor>, DriverError>;

    /// Close the statement.
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// A native result cursor.
///
/// Column ordinals are zero-based. Row positions passed to
/// [`absolute`](Self::absolute) are one-based. Primitive getters return `0`
/// for SQL NULL, callers distinguish via [`was_null`](Self::was_null).
#[async_trait]
pub trait NativeCursor: Send {
    /// Column metadata.
    fn columns(&self) -> Result<Vec<ColumnDescriptor>, DriverError>;

    /// Advance to the next row. Returns `false` once exhausted.
    async fn next(&mut self) -> Result<bool, DriverError>;

    /// Position on an absolute one-based row. Returns `false` if no such row.
    async fn absolute(&mut self, row: u64) -> Result<bool, DriverError>;

    fn get_int(&mut self, column: usize) -> Result<i32, DriverError>;

    fn get_long(&mut self, column: usize) -> Result<i64, DriverError>;

    fn get_double(&mut self, column: usize) -> Result<f64, DriverError>;

    fn get_string(&mut self, column: usize) -> Result<Option<String>, DriverError>;

    fn get_object(&mut self, column: usize) -> Result<Value, DriverError>;

    /// Whether the last primitive read was SQL NULL.
    fn was_null(&self) -> bool;

    /// Close the cursor.
    async fn close(&mut self) -> Result<(), DriverError>;
}
