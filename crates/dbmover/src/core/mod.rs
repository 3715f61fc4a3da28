//! Core types shared by every engine: the schema model, typed SQL values,
//! and the consumed execution/introspection interfaces.

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{Field, FieldType, ForeignKeyRef, Schema, Table, TableMeta};
pub use traits::{RowCursor, SchemaIntrospector, SqlExecutor};
pub use value::SqlValue;
