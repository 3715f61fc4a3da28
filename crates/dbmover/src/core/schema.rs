//! In-memory schema model: tables, fields, and foreign keys for one
//! connection side, built once from introspection metadata.

use serde::{Deserialize, Serialize};

use crate::dialect::DatabaseType;

/// Provider-neutral type tag for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Decimal,
    Float,
    Text,
    Boolean,
    DateTime,
    Date,
    Time,
    Guid,
    /// Binary/large-object data; excluded from row processing.
    Binary,
    Other,
}

impl FieldType {
    /// Binary and large-object fields never participate in the working
    /// field intersection.
    pub fn is_binary(&self) -> bool {
        matches!(self, FieldType::Binary)
    }
}

/// The primary-key field another field references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced table name.
    pub table: String,
    /// Referenced field name.
    pub field: String,
}

/// Column metadata for one table side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    /// Field name.
    pub name: String,

    /// Provider-neutral type tag.
    pub field_type: FieldType,

    /// Whether the server assigns this value on insert.
    pub auto_increment: bool,

    /// Whether NULL is allowed.
    pub allows_nulls: bool,

    /// Whether the field is part of the primary key.
    pub is_primary_key: bool,

    /// The referenced field, when this field is a foreign key.
    pub references: Option<ForeignKeyRef>,
}

impl Field {
    pub fn is_foreign_key(&self) -> bool {
        self.references.is_some()
    }
}

/// Table metadata as returned by schema introspection, before derived
/// flags and priorities are computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    /// Table name.
    pub name: String,

    /// Stable identifier pairing this table with its counterpart on the
    /// other side. Defaults to the lowercased name.
    pub map_name: Option<String>,

    /// Ordered column definitions.
    pub fields: Vec<Field>,
}

/// A table inside a built [`Schema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Stable map name pairing source and destination tables by identity
    /// rather than literal name.
    pub map_name: String,

    /// Ordered column definitions.
    pub fields: Vec<Field>,

    /// Topological depth in the FK graph. Lower priority means fewer
    /// dependencies: processed first for inserts, last for deletes.
    pub priority: i32,

    /// Include this table in the migration.
    pub process: bool,

    /// Cached row count, populated during analysis.
    pub row_count: i64,

    /// Whether the table owns an auto-increment field.
    pub has_auto_inc_field: bool,

    /// Whether any other table's foreign key references this table.
    pub referenced_by_foreign_keys: bool,
}

impl Table {
    /// The single auto-increment field tracked for identity translation.
    ///
    /// Only one auto-increment field per table participates in translation:
    /// the identity read-back query returns one value. When a table declares
    /// more than one, the first by field order wins and analysis reports the
    /// rest through a warning event.
    pub fn auto_inc_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.auto_increment)
    }

    /// All auto-increment fields, in declaration order.
    pub fn auto_inc_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.auto_increment)
    }

    /// Primary-key fields in declaration order.
    pub fn primary_key_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_primary_key)
    }

    /// Whether any field references this table itself.
    pub fn is_self_referencing(&self) -> bool {
        self.self_reference_field().is_some()
    }

    /// The first field holding a self-referencing foreign key.
    pub fn self_reference_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| {
            f.references
                .as_ref()
                .is_some_and(|r| r.table.eq_ignore_ascii_case(&self.name))
        })
    }

    /// Look up a field by name, case-insensitive.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

/// The tables of one connection side. Read-only after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    /// Vendor/dialect of the connection this schema was introspected from.
    pub database_type: DatabaseType,

    /// Tables in introspection order.
    pub tables: Vec<Table>,
}

impl Schema {
    /// Build a schema from introspection metadata, computing the derived
    /// per-table flags. Priorities are assigned separately by the
    /// dependency orderer.
    pub fn build(database_type: DatabaseType, metas: Vec<TableMeta>) -> Self {
        let mut tables: Vec<Table> = metas
            .into_iter()
            .map(|meta| {
                let has_auto_inc_field = meta.fields.iter().any(|f| f.auto_increment);
                let map_name = meta
                    .map_name
                    .unwrap_or_else(|| meta.name.to_lowercase());
                Table {
                    name: meta.name,
                    map_name,
                    fields: meta.fields,
                    priority: 0,
                    process: true,
                    row_count: 0,
                    has_auto_inc_field,
                    referenced_by_foreign_keys: false,
                }
            })
            .collect();

        // Mark tables that appear on the referenced side of any foreign key.
        let referenced: Vec<String> = tables
            .iter()
            .flat_map(|t| t.fields.iter())
            .filter_map(|f| f.references.as_ref())
            .map(|r| r.table.to_lowercase())
            .collect();
        for table in &mut tables {
            let name = table.name.to_lowercase();
            table.referenced_by_foreign_keys = referenced.contains(&name);
        }

        Self {
            database_type,
            tables,
        }
    }

    /// Look up a table by name, case-insensitive.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Look up a table by map name.
    pub fn table_by_map_name(&self, map_name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.map_name.eq_ignore_ascii_case(map_name))
    }
}
