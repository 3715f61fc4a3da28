//! Dependency orderer: assigns each table a priority from the foreign-key
//! graph.
//!
//! Priority is the length of the longest non-self foreign-key chain ending at
//! the table: a table with no outgoing FK has priority 0, and a table
//! referencing T gets at least priority(T) + 1. Sorting ascending yields an
//! insert-safe order; descending yields a delete-safe order. Self-referencing
//! foreign keys are excluded here and handled by row ordering instead.

use std::collections::HashMap;

use crate::core::schema::Table;
use crate::error::{MoveError, Result};

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    Unvisited,
    InProgress,
    Done,
}

/// Assign priorities to all tables, erroring on a cross-table cycle.
///
/// Ties keep the original enumeration order when callers sort with a stable
/// sort. Foreign keys pointing at tables outside the set are ignored.
pub fn assign_priorities(tables: &mut [Table]) -> Result<()> {
    let index: HashMap<String, usize> = tables
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name.to_lowercase(), i))
        .collect();

    // Non-self outgoing edges, by table index.
    let edges: Vec<Vec<usize>> = tables
        .iter()
        .map(|t| {
            t.fields
                .iter()
                .filter_map(|f| f.references.as_ref())
                .filter(|r| !r.table.eq_ignore_ascii_case(&t.name))
                .filter_map(|r| index.get(&r.table.to_lowercase()).copied())
                .collect()
        })
        .collect();

    let mut state = vec![Visit::Unvisited; tables.len()];
    let mut priority = vec![0i32; tables.len()];

    for start in 0..tables.len() {
        visit(start, &edges, &mut state, &mut priority, tables)?;
    }

    for (table, p) in tables.iter_mut().zip(priority) {
        table.priority = p;
    }
    Ok(())
}

fn visit(
    node: usize,
    edges: &[Vec<usize>],
    state: &mut [Visit],
    priority: &mut [i32],
    tables: &[Table],
) -> Result<i32> {
    match state[node] {
        Visit::Done => return Ok(priority[node]),
        Visit::InProgress => {
            return Err(MoveError::DependencyCycle(format!(
                "table '{}' participates in a foreign key cycle",
                tables[node].name
            )));
        }
        Visit::Unvisited => {}
    }

    state[node] = Visit::InProgress;
    let mut depth = 0;
    for &dep in &edges[node] {
        let dep_priority = visit(dep, edges, state, priority, tables)?;
        depth = depth.max(dep_priority + 1);
    }
    state[node] = Visit::Done;
    priority[node] = depth;
    Ok(depth)
}

/// Indices of processable tables sorted ascending by priority (insert-safe),
/// ties stable by enumeration order.
pub fn insert_order(tables: &[Table]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..tables.len()).filter(|&i| tables[i].process).collect();
    order.sort_by_key(|&i| tables[i].priority);
    order
}

/// Indices of processable tables sorted descending by priority (delete-safe):
/// the exact reverse of [`insert_order`].
pub fn delete_order(tables: &[Table]) -> Vec<usize> {
    let mut order = insert_order(tables);
    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Field, FieldType, ForeignKeyRef, Schema, TableMeta};
    use crate::dialect::DatabaseType;

    fn id_field() -> Field {
        Field {
            name: "Id".to_string(),
            field_type: FieldType::Integer,
            auto_increment: true,
            allows_nulls: false,
            is_primary_key: true,
            references: None,
        }
    }

    fn fk_field(name: &str, table: &str) -> Field {
        Field {
            name: name.to_string(),
            field_type: FieldType::Integer,
            auto_increment: false,
            allows_nulls: true,
            is_primary_key: false,
            references: Some(ForeignKeyRef {
                table: table.to_string(),
                field: "Id".to_string(),
            }),
        }
    }

    fn build(metas: Vec<(&str, Vec<Field>)>) -> Vec<Table> {
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
        .tables
    }

    #[test]
    fn test_priorities_respect_fk_edges() {
        let mut tables = build(vec![
            ("OrderLines", vec![id_field(), fk_field("OrderId", "Orders")]),
            ("Customers", vec![id_field()]),
            ("Orders", vec![id_field(), fk_field("CustomerId", "Customers")]),
        ]);
        assign_priorities(&mut tables).unwrap();

        let by_name: std::collections::HashMap<_, _> =
            tables.iter().map(|t| (t.name.as_str(), t.priority)).collect();
        assert_eq!(by_name["Customers"], 0);
        assert_eq!(by_name["Orders"], 1);
        assert_eq!(by_name["OrderLines"], 2);

        // Every FK edge A -> B must have priority(A) > priority(B)
        for table in &tables {
            for fk in table.fields.iter().filter_map(|f| f.references.as_ref()) {
                if fk.table.eq_ignore_ascii_case(&table.name) {
                    continue;
                }
                let referenced = tables
                    .iter()
                    .find(|t| t.name.eq_ignore_ascii_case(&fk.table))
                    .unwrap();
                assert!(table.priority > referenced.priority);
            }
        }
    }

    #[test]
    fn test_longest_chain_wins() {
        // D references both A (chain length 1) and C (chain A <- B <- C),
        // so D's priority must clear the longer chain.
        let mut tables = build(vec![
            ("A", vec![id_field()]),
            ("B", vec![id_field(), fk_field("AId", "A")]),
            ("C", vec![id_field(), fk_field("BId", "B")]),
            (
                "D",
                vec![id_field(), fk_field("AId", "A"), fk_field("CId", "C")],
            ),
        ]);
        assign_priorities(&mut tables).unwrap();
        let by_name: std::collections::HashMap<_, _> =
            tables.iter().map(|t| (t.name.as_str(), t.priority)).collect();
        assert_eq!(by_name["D"], 3);
    }

    #[test]
    fn test_self_reference_excluded() {
        let mut tables = build(vec![(
            "Employees",
            vec![id_field(), fk_field("ManagerId", "Employees")],
        )]);
        assign_priorities(&mut tables).unwrap();
        assert_eq!(tables[0].priority, 0);
    }

    #[test]
    fn test_cross_table_cycle_is_fatal() {
        let mut tables = build(vec![
            ("A", vec![id_field(), fk_field("BId", "B")]),
            ("B", vec![id_field(), fk_field("AId", "A")]),
        ]);
        let err = assign_priorities(&mut tables).unwrap_err();
        assert!(matches!(err, MoveError::DependencyCycle(_)));
    }

    #[test]
    fn test_fk_to_unknown_table_ignored() {
        let mut tables = build(vec![(
            "Orders",
            vec![id_field(), fk_field("WarehouseId", "Warehouses")],
        )]);
        assign_priorities(&mut tables).unwrap();
        assert_eq!(tables[0].priority, 0);
    }

    #[test]
    fn test_delete_order_reverses_insert_order() {
        let mut tables = build(vec![
            ("Customers", vec![id_field()]),
            ("Orders", vec![id_field(), fk_field("CustomerId", "Customers")]),
            ("Invoices", vec![id_field(), fk_field("OrderId", "Orders")]),
        ]);
        assign_priorities(&mut tables).unwrap();

        let forward = insert_order(&tables);
        let mut reversed = delete_order(&tables);
        reversed.reverse();
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_ties_stay_in_enumeration_order() {
        let mut tables = build(vec![
            ("Zebra", vec![id_field()]),
            ("Alpha", vec![id_field()]),
            ("Mid", vec![id_field()]),
        ]);
        assign_priorities(&mut tables).unwrap();
        let order = insert_order(&tables);
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_unprocessed_tables_excluded_from_order() {
        let mut tables = build(vec![("A", vec![id_field()]), ("B", vec![id_field()])]);
        assign_priorities(&mut tables).unwrap();
        tables[0].process = false;
        assert_eq!(insert_order(&tables), vec![1]);
    }
}
