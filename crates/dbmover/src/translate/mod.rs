//! Auto-increment translation: maps a source identity value to the value the
//! destination actually assigned, and dereferences foreign keys through those
//! maps, recursively across referential chains.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::core::schema::{Field, Schema, Table};
use crate::core::value::SqlValue;

/// Case-folded (table map name, field name) pair keying one translation map.
type TranslationKey = (String, String);

/// All identity translation maps for one migration run.
///
/// Populated by the row copy engine as parent rows commit; read by later rows
/// and later tables when dereferencing foreign keys. Single writer, strictly
/// ordered: priority ordering guarantees the entry exists before any
/// referencing row is processed.
#[derive(Debug, Default)]
pub struct TranslationStore {
    maps: HashMap<TranslationKey, HashMap<i64, i64>>,
}

impl TranslationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(table_map_name: &str, field: &str) -> TranslationKey {
        (table_map_name.to_lowercase(), field.to_lowercase())
    }

    /// Record that `source` became `destination` for an auto-increment field.
    pub fn record(&mut self, table_map_name: &str, field: &str, source: i64, destination: i64) {
        trace!(
            table = table_map_name,
            field,
            source,
            destination,
            "recording identity translation"
        );
        self.maps
            .entry(Self::key(table_map_name, field))
            .or_default()
            .insert(source, destination);
    }

    /// Look up the destination value recorded for a source value.
    pub fn lookup(&self, table_map_name: &str, field: &str, source: i64) -> Option<i64> {
        self.maps
            .get(&Self::key(table_map_name, field))
            .and_then(|m| m.get(&source))
            .copied()
    }

    /// Number of entries recorded for one field's map.
    pub fn len(&self, table_map_name: &str, field: &str) -> usize {
        self.maps
            .get(&Self::key(table_map_name, field))
            .map_or(0, HashMap::len)
    }

    /// Dereference a foreign-key value through the translation maps.
    ///
    /// If `field` references an auto-increment field, the value is looked up
    /// in that field's map; a miss returns the value unchanged (pre-existing
    /// or unmapped destination rows are tolerated). If it references a
    /// non-auto-increment field, the chain is followed recursively through
    /// the referenced table, with a visited set guarding against reference
    /// cycles; a cycle returns the value unchanged.
    pub fn dereference(
        &self,
        schema: &Schema,
        table: &Table,
        field: &Field,
        value: &SqlValue,
    ) -> SqlValue {
        let mut visited = HashSet::new();
        self.dereference_inner(schema, table, field, value, &mut visited)
    }

    fn dereference_inner(
        &self,
        schema: &Schema,
        table: &Table,
        field: &Field,
        value: &SqlValue,
        visited: &mut HashSet<TranslationKey>,
    ) -> SqlValue {
        let Some(reference) = field.references.as_ref() else {
            return value.clone();
        };
        let Some(source) = value.as_i64() else {
            return value.clone();
        };
        if !visited.insert(Self::key(&table.name, &field.name)) {
            return value.clone();
        }

        let Some(referenced_table) = schema.table(&reference.table) else {
            return value.clone();
        };
        let Some(referenced_field) = referenced_table.field(&reference.field) else {
            return value.clone();
        };

        if referenced_field.auto_increment {
            match self.lookup(&referenced_table.map_name, &referenced_field.name, source) {
                Some(mapped) => SqlValue::I64(mapped),
                None => value.clone(),
            }
        } else {
            // Follow the chain: the referenced field may itself be a foreign
            // key to the field that actually carries the identity.
            self.dereference_inner(schema, referenced_table, referenced_field, value, visited)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{FieldType, ForeignKeyRef, TableMeta};
    use crate::dialect::DatabaseType;

    fn field(name: &str, auto_increment: bool, references: Option<(&str, &str)>) -> Field {
        Field {
            name: name.to_string(),
            field_type: FieldType::Integer,
            auto_increment,
            allows_nulls: true,
            is_primary_key: auto_increment,
            references: references.map(|(t, f)| ForeignKeyRef {
                table: t.to_string(),
                field: f.to_string(),
            }),
        }
    }

    fn schema(metas: Vec<(&str, Vec<Field>)>) -> Schema {
        Schema::build(
            DatabaseType::Sqlite,
            metas
                .into_iter()
                .map(|(name, fields)| TableMeta {
                    name: name.to_string(),
                    map_name: None,
                    fields,
                })
                .collect(),
        )
    }

    #[test]
    fn test_record_and_lookup() {
        let mut store = TranslationStore::new();
        store.record("customers", "Id", 5, 105);
        assert_eq!(store.lookup("Customers", "id", 5), Some(105));
        assert_eq!(store.lookup("customers", "Id", 6), None);
        assert_eq!(store.len("customers", "id"), 1);
    }

    #[test]
    fn test_dereference_hits_map() {
        let schema = schema(vec![
            ("Customers", vec![field("Id", true, None)]),
            (
                "Orders",
                vec![
                    field("Id", true, None),
                    field("CustomerId", false, Some(("Customers", "Id"))),
                ],
            ),
        ]);
        let mut store = TranslationStore::new();
        store.record("customers", "Id", 7, 42);

        let orders = schema.table("Orders").unwrap();
        let fk = orders.field("CustomerId").unwrap();
        let out = store.dereference(&schema, orders, fk, &SqlValue::I64(7));
        assert_eq!(out, SqlValue::I64(42));
    }

    #[test]
    fn test_dereference_miss_returns_original() {
        let schema = schema(vec![
            ("Customers", vec![field("Id", true, None)]),
            (
                "Orders",
                vec![field("CustomerId", false, Some(("Customers", "Id")))],
            ),
        ]);
        let store = TranslationStore::new();
        let orders = schema.table("Orders").unwrap();
        let fk = orders.field("CustomerId").unwrap();
        // No entry recorded: pre-existing destination rows keep their value
        assert_eq!(
            store.dereference(&schema, orders, fk, &SqlValue::I64(7)),
            SqlValue::I64(7)
        );
    }

    #[test]
    fn test_dereference_two_hop_chain() {
        // C.RegionCode -> B.Code (not auto-inc) -> A.Id (auto-inc)
        let schema = schema(vec![
            ("A", vec![field("Id", true, None)]),
            ("B", vec![field("Code", false, Some(("A", "Id")))]),
            ("C", vec![field("RegionCode", false, Some(("B", "Code")))]),
        ]);
        let mut store = TranslationStore::new();
        store.record("a", "Id", 3, 30);

        let c = schema.table("C").unwrap();
        let fk = c.field("RegionCode").unwrap();
        assert_eq!(store.dereference(&schema, c, fk, &SqlValue::I64(3)), SqlValue::I64(30));
    }

    #[test]
    fn test_dereference_cycle_guard() {
        // A.Ref -> B.Ref -> A.Ref: neither end is auto-increment
        let schema = schema(vec![
            ("A", vec![field("Ref", false, Some(("B", "Ref")))]),
            ("B", vec![field("Ref", false, Some(("A", "Ref")))]),
        ]);
        let store = TranslationStore::new();
        let a = schema.table("A").unwrap();
        let fk = a.field("Ref").unwrap();
        // Cycle detected: value returned unchanged instead of looping
        assert_eq!(store.dereference(&schema, a, fk, &SqlValue::I64(1)), SqlValue::I64(1));
    }

    #[test]
    fn test_dereference_non_integer_and_null_pass_through() {
        let schema = schema(vec![
            ("Customers", vec![field("Id", true, None)]),
            (
                "Orders",
                vec![field("CustomerId", false, Some(("Customers", "Id")))],
            ),
        ]);
        let store = TranslationStore::new();
        let orders = schema.table("Orders").unwrap();
        let fk = orders.field("CustomerId").unwrap();
        assert_eq!(store.dereference(&schema, orders, fk, &SqlValue::Null), SqlValue::Null);
    }
}
