//! Column types and type inference.

pub mod infer;
pub mod mapping;

pub use infer::{infer_column_type, infer_column_types, DatabaseProduct, Dialect, GenericDialect};
pub use mapping::{CellValue, ColumnType};
