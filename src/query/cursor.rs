//! Cursor wrapper that owns its statement.

use crate::error::{SqlStatementError, StatementFailure};
use crate::types::{CellValue, ColumnType};
use arrow::record_batch::RecordBatch;

use super::batch::RowBatchBuilder;
use super::statement::SqlStatement;

/// A result cursor whose [`close`](Self::close) closes the owning statement,
/// releasing its gate slot and native resources.
#[derive(Debug)]
pub struct SqlCursor {
    statement: SqlStatement,
}

impl SqlCursor {
    pub(crate) fn new(statement: SqlStatement) -> Self {
        Self { statement }
    }

    pub fn statement(&self) -> &SqlStatement {
        &self.statement
    }

    pub fn statement_mut(&mut self) -> &mut SqlStatement {
        &mut self.statement
    }

    pub async fn next(&mut self) -> Result<bool, SqlStatementError> {
        self.statement.next().await
    }

    pub async fn value(&mut self, ordinal: usize) -> Result<CellValue, SqlStatementError> {
        self.statement.value(ordinal).await
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.statement.column_types()
    }

    pub fn row_count(&self) -> u64 {
        self.statement.row_count()
    }

    pub fn is_closed(&self) -> bool {
        self.statement.is_closed()
    }

    /// Read up to `max_rows` rows into an Arrow batch.
    ///
    /// Returns `None` once the result is exhausted.
    ///
    /// # Errors
    /// Returns `ContractViolation` for a zero `max_rows`, leaving the
    /// statement open. Returns `FetchFailure` if reading or converting a row
    /// fails. The statement is closed in that case.
    pub async fn next_batch(
        &mut self,
        max_rows: usize,
    ) -> Result<Option<RecordBatch>, SqlStatementError> {
        if max_rows == 0 {
            return Err(self.statement.error(StatementFailure::ContractViolation(
                "batch size must be positive".to_string(),
            )));
        }
        let names = self
            .statement
            .columns()
            .iter()
            .map(|c| c.name.clone())
            .collect::<Vec<_>>();
        let mut builder = RowBatchBuilder::new(&names, &self.statement.column_types());

        while builder.len() < max_rows && self.statement.next().await? {
            let values = self.statement.row_values().await?;
            if let Err(e) = builder.append_row(&values) {
                return Err(self.statement.fail(StatementFailure::Conversion(e)).await);
            }
        }

        if builder.is_empty() {
            return Ok(None);
        }
        match builder.finish() {
            Ok(batch) => Ok(Some(batch)),
            Err(e) => Err(self.statement.fail(StatementFailure::Conversion(e)).await),
        }
    }

    /// Close the cursor and its statement.
    pub async fn close(&mut self) -> Result<(), SqlStatementError> {
        self.statement.close().await
    }
}
