//! Statement execution and result reading.
//!
//! The query module is organized into:
//! - `statement` - statement lifecycle: admission, dispatch, close
//! - `accessor` - per-column value readers with per-row caching
//! - `cursor` - cursor wrapper that owns and closes its statement
//! - `batch` - Arrow `RecordBatch` materialisation of rows

pub mod accessor;
pub mod batch;
pub mod cursor;
pub mod statement;

pub use accessor::{Accessor, AccessorTable};
pub use batch::RowBatchBuilder;
pub use cursor::SqlCursor;
pub use statement::{SqlStatement, SqlStatementBuilder, StatementCallback, StatementState};
