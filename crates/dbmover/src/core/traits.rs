//! Consumed interfaces for SQL execution and schema introspection.
//!
//! The engine never talks to a database driver directly. Callers supply
//! implementations of these traits; connection handling, parameter binding
//! conveniences, and provider discovery all live behind them.

use std::time::Duration;

use async_trait::async_trait;

use crate::core::schema::TableMeta;
use crate::core::value::SqlValue;
use crate::dialect::DatabaseType;
use crate::error::Result;

/// Forward-only stream over the rows of one query.
///
/// Rows are pulled one at a time; the engine never buffers a full result
/// set, and each row's statements complete before the next row is read.
#[async_trait]
pub trait RowCursor: Send {
    /// Fetch the next row, or `None` when the result set is exhausted.
    async fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>>;
}

/// Run SQL against one connection.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute a statement, returning the number of rows affected.
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<u64>;

    /// Execute a query expected to return a single value.
    async fn execute_scalar(&self, sql: &str, timeout: Duration) -> Result<Option<SqlValue>>;

    /// Open a forward-only cursor over a query's rows.
    async fn open_cursor(&self, sql: &str, timeout: Duration) -> Result<Box<dyn RowCursor>>;
}

/// Enumerate the tables, fields, and key metadata of one connection.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// The vendor/dialect of the connection.
    fn database_type(&self) -> DatabaseType;

    /// All tables with field, nullability, and primary/foreign key metadata.
    async fn tables(&self) -> Result<Vec<TableMeta>>;
}
