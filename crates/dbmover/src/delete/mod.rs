//! Row delete engine: removes destination rows one by one, keyed by primary
//! key, in delete-safe (reverse dependency) order.
//!
//! The set of rows to delete is read from the authority side: the source when
//! source referential integrity drives the migration, otherwise the
//! destination itself.

use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::MigrationConfig;
use crate::copy::TableOutcome;
use crate::core::schema::Table;
use crate::core::traits::SqlExecutor;
use crate::dialect::Dialect;
use crate::error::{MoveError, Result};
use crate::progress::{Listeners, OverallProgress};

pub(crate) struct RowDeleteEngine<'a> {
    pub authority: &'a dyn SqlExecutor,
    pub destination: &'a dyn SqlExecutor,
    pub authority_dialect: Dialect,
    pub destination_dialect: Dialect,
    pub config: &'a MigrationConfig,
    pub listeners: &'a Listeners,
}

impl<'a> RowDeleteEngine<'a> {
    /// Delete all rows of one table pair. `authority_table` supplies the
    /// key stream; `dest_table` is where the deletes run.
    pub async fn delete_table(
        &self,
        overall: &mut OverallProgress,
        authority_table: &Table,
        dest_table: &Table,
        cancel: &watch::Receiver<bool>,
    ) -> Result<TableOutcome> {
        let timeout = self.config.timeout();
        let table_name = dest_table.name.clone();
        let total = authority_table.row_count;

        // Key fields usable on both sides: authority primary-key fields that
        // also exist on the destination.
        let keys: Vec<(&str, String)> = authority_table
            .primary_key_fields()
            .filter_map(|f| {
                dest_table
                    .field(&f.name)
                    .map(|df| (f.name.as_str(), df.name.clone()))
            })
            .collect();
        if keys.is_empty() {
            overall.credit(total, self.listeners);
            self.listeners
                .table_skipped(&table_name, "no primary key usable for row deletes");
            return Ok(TableOutcome {
                skipped: true,
                ..Default::default()
            });
        }

        let select = format!(
            "SELECT {} FROM {}",
            keys.iter()
                .map(|(a, _)| self.authority_dialect.quote_ident(a))
                .collect::<Vec<_>>()
                .join(", "),
            self.authority_dialect.quote_ident(&authority_table.name)
        );
        debug!(table = %table_name, sql = %select, "starting table delete");
        let mut cursor = self.authority.open_cursor(&select, timeout).await?;

        let mut outcome = TableOutcome::default();
        let mut processed: i64 = 0;
        self.listeners.row_progress(&table_name, 0, total);

        loop {
            if *cancel.borrow() {
                return Err(MoveError::Cancelled);
            }
            let Some(row) = cursor.next_row().await? else {
                break;
            };

            let predicates: Vec<String> = keys
                .iter()
                .zip(&row)
                .filter(|(_, v)| !v.is_null())
                .map(|((_, dest_name), v)| {
                    format!(
                        "{} = {}",
                        self.destination_dialect.quote_ident(dest_name),
                        v.to_sql_literal(&self.destination_dialect)
                    )
                })
                .collect();

            if predicates.is_empty() {
                // A row whose every key value is NULL cannot be addressed
                self.listeners.statement_failed(
                    &table_name,
                    "",
                    "row has no non-null primary key value",
                );
                outcome.rows_failed += 1;
            } else {
                let delete_sql = format!(
                    "DELETE FROM {} WHERE {}",
                    self.destination_dialect.quote_ident(&table_name),
                    predicates.join(" AND ")
                );
                match self.destination.execute(&delete_sql, timeout).await {
                    Ok(_) => outcome.rows += 1,
                    Err(e) => {
                        self.listeners
                            .statement_failed(&table_name, &delete_sql, &e.to_string());
                        outcome.rows_failed += 1;
                    }
                }
            }

            processed += 1;
            overall.step(self.listeners);
            if processed % self.config.row_report_interval as i64 == 0 {
                self.listeners.row_progress(&table_name, processed, total);
            }
        }

        self.listeners
            .row_progress(&table_name, processed, total.max(processed));
        info!(
            table = %table_name,
            rows = outcome.rows,
            failed = outcome.rows_failed,
            "table delete finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Field, FieldType, Schema, TableMeta};
    use crate::core::traits::RowCursor;
    use crate::core::value::SqlValue;
    use crate::dialect::DatabaseType;
    use crate::progress::Listeners;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedDb {
        rows: Mutex<Vec<Vec<SqlValue>>>,
        executed: Mutex<Vec<String>>,
    }

    struct ScriptedCursor {
        rows: Vec<Vec<SqlValue>>,
    }

    #[async_trait::async_trait]
    impl RowCursor for ScriptedCursor {
        async fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>> {
            if self.rows.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.rows.remove(0)))
            }
        }
    }

    #[async_trait::async_trait]
    impl SqlExecutor for ScriptedDb {
        async fn execute(&self, sql: &str, _t: Duration) -> Result<u64> {
            self.executed.lock().unwrap().push(sql.to_string());
            Ok(1)
        }
        async fn execute_scalar(&self, _sql: &str, _t: Duration) -> Result<Option<SqlValue>> {
            Ok(None)
        }
        async fn open_cursor(&self, _sql: &str, _t: Duration) -> Result<Box<dyn RowCursor>> {
            Ok(Box::new(ScriptedCursor {
                rows: self.rows.lock().unwrap().clone(),
            }))
        }
    }

    fn table(name: &str, fields: Vec<Field>) -> Table {
        Schema::build(
            DatabaseType::Sqlite,
            vec![TableMeta {
                name: name.to_string(),
                map_name: None,
                fields,
            }],
        )
        .tables
        .into_iter()
        .next()
        .unwrap()
    }

    fn pk(name: &str) -> Field {
        Field {
            name: name.to_string(),
            field_type: FieldType::Integer,
            auto_increment: false,
            allows_nulls: false,
            is_primary_key: true,
            references: None,
        }
    }

    #[tokio::test]
    async fn test_deletes_by_primary_key() {
        let db = ScriptedDb {
            rows: Mutex::new(vec![vec![SqlValue::I64(1)], vec![SqlValue::I64(2)]]),
            executed: Mutex::new(Vec::new()),
        };
        let config = MigrationConfig::default();
        let listeners = Listeners::default();
        let engine = RowDeleteEngine {
            authority: &db,
            destination: &db,
            authority_dialect: Dialect::new(DatabaseType::Sqlite),
            destination_dialect: Dialect::new(DatabaseType::Sqlite),
            config: &config,
            listeners: &listeners,
        };

        let t = table("Orders", vec![pk("Id")]);
        let mut overall = OverallProgress::new(2);
        let (_tx, rx) = watch::channel(false);
        let outcome = engine
            .delete_table(&mut overall, &t, &t, &rx)
            .await
            .unwrap();

        assert_eq!(outcome.rows, 2);
        let executed = db.executed.lock().unwrap();
        assert_eq!(executed[0], "DELETE FROM \"Orders\" WHERE \"Id\" = 1");
        assert_eq!(executed[1], "DELETE FROM \"Orders\" WHERE \"Id\" = 2");
    }

    #[tokio::test]
    async fn test_skips_table_without_primary_key() {
        let db = ScriptedDb {
            rows: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        };
        let config = MigrationConfig::default();
        let listeners = Listeners::default();
        let engine = RowDeleteEngine {
            authority: &db,
            destination: &db,
            authority_dialect: Dialect::new(DatabaseType::Sqlite),
            destination_dialect: Dialect::new(DatabaseType::Sqlite),
            config: &config,
            listeners: &listeners,
        };

        let mut t = table(
            "Log",
            vec![Field {
                name: "Message".to_string(),
                field_type: FieldType::Text,
                auto_increment: false,
                allows_nulls: true,
                is_primary_key: false,
                references: None,
            }],
        );
        t.row_count = 5;
        let mut overall = OverallProgress::new(5);
        let (_tx, rx) = watch::channel(false);
        let outcome = engine
            .delete_table(&mut overall, &t, &t, &rx)
            .await
            .unwrap();

        assert!(outcome.skipped);
        // The skipped table's rows are still credited to overall progress
        assert_eq!(overall.current, 5);
        assert!(db.executed.lock().unwrap().is_empty());
    }
}
