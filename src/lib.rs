//! # rolap-sql
//!
//! Bounded-concurrency SQL statement execution for a relational OLAP engine.
//!
//! Every statement passes a fair, server-wide admission gate before it may
//! hold a native statement open, reports start/execute/end events to the
//! server's monitor, infers a read strategy per result column and always
//! releases its slot, cursor, statement and connection, even when it fails.
//!
//! The database itself is reached through the traits in [`driver`], which a
//! driver adapter implements.
//!
//! ## Example
//!
//! ```no_run
//! # use rolap_sql::*;
//! # use std::sync::Arc;
//! # async fn example(source: Arc<dyn driver::ConnectionSource>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::builder().query_limit(8).build()?;
//! let server = Server::new("olap-1", config, Arc::new(TracingMonitor))?;
//! let execution = Execution::new(server);
//!
//! let locus = StatementLocus::new(execution, "Segment.load", "Error while loading segment")
//!     .with_purpose(Purpose::Tuples);
//! let statement = SqlStatement::builder(source, locus, "select year, sum(sales) from fact group by year")
//!     .build();
//!
//! let mut cursor = statement.into_cursor();
//! cursor.statement_mut().execute().await?;
//! while let Some(batch) = cursor.next_batch(1024).await? {
//!     println!("Rows: {}", batch.num_rows());
//! }
//! cursor.close().await?;
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod config;
pub mod driver;
pub mod error;
pub mod monitor;
pub mod query;
pub mod server;
pub mod types;

// Re-export public API
pub use config::EngineConfig;
pub use error::{DriverError, ErrorKind, SqlStatementError, StatementFailure};
pub use monitor::{Monitor, SqlStatementEvent, TracingMonitor};
pub use query::{SqlCursor, SqlStatement, StatementState};
pub use server::{Execution, Purpose, Server, ServerRegistry, StatementLocus};
pub use types::{CellValue, ColumnType, Dialect};
