//! # dbmover
//!
//! Schema-aware row migration library for copying and deleting data between
//! two relational databases, independent of vendor.
//!
//! The library discovers both schemas, orders tables by foreign-key
//! dependencies, and moves rows with support for:
//!
//! - **Dependency ordering** so referenced rows always exist before the rows
//!   pointing at them
//! - **Identity translation** when the destination assigns new
//!   auto-increment values to migrated rows
//! - **Insert-or-update reconciliation** against pre-populated destinations
//! - **Bulk loading** through a staged delimited file on dialects that
//!   support it
//! - **Destination clearing** and reverse-order row deletes
//!
//! Database drivers stay outside: callers implement [`SqlExecutor`] and
//! [`SchemaIntrospector`] over their connections and hand both sides to the
//! engine.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbmover::{MigrationConfig, MigrationEngine, MigrationSide};
//!
//! # async fn run(source: MigrationSide, destination: MigrationSide) -> dbmover::Result<()> {
//! let config = MigrationConfig::load("config.yaml")?;
//! let engine = MigrationEngine::new(source, destination, config)?;
//! let result = engine.copy_rows(None).await?;
//! println!("Copied {} rows", result.rows_processed);
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub(crate) mod clear;
pub mod config;
pub(crate) mod copy;
pub mod core;
pub(crate) mod delete;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod order;
pub mod progress;
pub mod translate;

// Re-exports for convenient access
pub use crate::core::schema::{Field, FieldType, ForeignKeyRef, Schema, Table, TableMeta};
pub use crate::core::traits::{RowCursor, SchemaIntrospector, SqlExecutor};
pub use crate::core::value::SqlValue;
pub use config::MigrationConfig;
pub use dialect::{DatabaseType, Dialect, ExplicitIdentityMode};
pub use engine::{MigrationEngine, MigrationResult, MigrationSide, RunStatus};
pub use error::{MoveError, Result};
pub use progress::MigrationListener;
pub use translate::TranslationStore;
