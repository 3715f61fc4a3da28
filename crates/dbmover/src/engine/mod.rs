//! Migration engine: orchestrates analysis, clearing, and the copy and
//! delete passes across the two connection sides.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clear::ClearEngine;
use crate::config::MigrationConfig;
use crate::copy::RowCopyEngine;
use crate::core::schema::Schema;
use crate::core::traits::{SchemaIntrospector, SqlExecutor};
use crate::delete::RowDeleteEngine;
use crate::dialect::Dialect;
use crate::error::{MoveError, Result};
use crate::order;
use crate::progress::{Listeners, MigrationListener, OverallProgress};
use crate::translate::TranslationStore;

/// One side of a migration: statement execution plus schema introspection
/// over the same connection.
#[derive(Clone)]
pub struct MigrationSide {
    pub executor: Arc<dyn SqlExecutor>,
    pub introspector: Arc<dyn SchemaIntrospector>,
}

/// Terminal status of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
    Cancelled,
}

/// Summary of one copy or delete run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub tables_total: usize,
    pub tables_succeeded: usize,
    pub tables_skipped: usize,
    pub tables_failed: usize,
    pub rows_processed: i64,
    pub rows_failed: i64,
    pub rows_per_second: f64,
    pub failed_tables: Vec<String>,
}

impl MigrationResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Accumulates per-table outcomes into a [`MigrationResult`].
struct RunTally {
    run_id: String,
    started_at: DateTime<Utc>,
    tables_total: usize,
    tables_succeeded: usize,
    tables_skipped: usize,
    rows_processed: i64,
    rows_failed: i64,
    failed_tables: Vec<String>,
    cancelled: bool,
}

impl RunTally {
    fn start(tables_total: usize) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            tables_total,
            tables_succeeded: 0,
            tables_skipped: 0,
            rows_processed: 0,
            rows_failed: 0,
            failed_tables: Vec::new(),
            cancelled: false,
        }
    }

    fn finish(self) -> MigrationResult {
        let completed_at = Utc::now();
        let duration_seconds = (completed_at - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let status = if self.cancelled {
            RunStatus::Cancelled
        } else if self.failed_tables.is_empty() && self.rows_failed == 0 {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        };
        let rows_per_second = if duration_seconds > 0.0 {
            self.rows_processed as f64 / duration_seconds
        } else {
            0.0
        };
        MigrationResult {
            run_id: self.run_id,
            status,
            started_at: self.started_at,
            completed_at,
            duration_seconds,
            tables_total: self.tables_total,
            tables_succeeded: self.tables_succeeded,
            tables_skipped: self.tables_skipped,
            tables_failed: self.failed_tables.len(),
            rows_processed: self.rows_processed,
            rows_failed: self.rows_failed,
            rows_per_second,
            failed_tables: self.failed_tables,
        }
    }
}

/// Schema-driven row migration between two live connections.
///
/// The engine never interprets vendor SQL itself: all statements are built
/// through each side's [`Dialect`] and executed through the side's
/// [`SqlExecutor`]. Processing is strictly sequential; every statement
/// completes before the next row is read.
pub struct MigrationEngine {
    source: MigrationSide,
    destination: MigrationSide,
    config: MigrationConfig,
    listeners: Listeners,
}

impl MigrationEngine {
    pub fn new(
        source: MigrationSide,
        destination: MigrationSide,
        config: MigrationConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            destination,
            config,
            listeners: Listeners::default(),
        })
    }

    /// Register a progress listener. Listeners are invoked in registration
    /// order from the processing task.
    pub fn add_listener(&mut self, listener: Arc<dyn MigrationListener>) {
        self.listeners.push(listener);
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Introspect both sides, apply the table filters, and assign dependency
    /// priorities. Fails on a cross-table foreign key cycle.
    pub async fn analyze(&self) -> Result<(Schema, Schema)> {
        let source_type = self.source.introspector.database_type();
        let dest_type = self.destination.introspector.database_type();
        info!(?source_type, ?dest_type, "analyzing schemas");

        let mut source_schema =
            Schema::build(source_type, self.source.introspector.tables().await?);
        let mut dest_schema =
            Schema::build(dest_type, self.destination.introspector.tables().await?);

        for table in &mut source_schema.tables {
            table.process = self.config.should_process(&table.name);
        }
        for table in &mut dest_schema.tables {
            table.process = self.config.should_process(&table.name);
        }

        order::assign_priorities(&mut source_schema.tables)?;
        order::assign_priorities(&mut dest_schema.tables)?;

        for table in source_schema.tables.iter().filter(|t| t.process) {
            let autos = table.auto_inc_fields().count();
            if autos > 1 {
                warn!(table = %table.name, count = autos, "multiple auto-increment fields, only the first is translated");
                self.listeners.warning(&format!(
                    "{}: {} auto-increment fields; only '{}' participates in identity translation",
                    table.name,
                    autos,
                    table
                        .auto_inc_field()
                        .map(|f| f.name.as_str())
                        .unwrap_or_default()
                ));
            }
        }

        Ok((source_schema, dest_schema))
    }

    /// Copy all rows from the source into the destination in insert-safe
    /// order, returning the run summary.
    ///
    /// Pass a watch receiver to request cancellation; the run stops at the
    /// next row boundary with [`RunStatus::Cancelled`].
    pub async fn copy_rows(
        &self,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<MigrationResult> {
        let (source_schema, dest_schema) = self.analyze().await?;
        let source_dialect = Dialect::new(source_schema.database_type);
        let dest_dialect = Dialect::new(dest_schema.database_type);

        let mut source_schema = source_schema;
        self.count_rows(
            self.source.executor.as_ref(),
            source_dialect,
            &mut source_schema,
        )
        .await;

        let insert_order = order::insert_order(&source_schema.tables);
        if insert_order.is_empty() {
            return Err(MoveError::config("no tables to process after analysis"));
        }

        let cancel = cancel.unwrap_or_else(|| watch::channel(false).1);

        if self.config.clear_destination_tables {
            let clear = ClearEngine {
                destination: self.destination.executor.as_ref(),
                dialect: dest_dialect,
                config: &self.config,
                listeners: &self.listeners,
            };
            let clear_order = order::delete_order(&dest_schema.tables);
            clear.clear_tables(&dest_schema, &clear_order).await?;
        }

        let total_rows: i64 = insert_order
            .iter()
            .map(|&i| source_schema.tables[i].row_count)
            .sum();
        let mut overall = OverallProgress::new(total_rows);
        let mut translations = TranslationStore::new();
        let mut tally = RunTally::start(insert_order.len());
        info!(run_id = %tally.run_id, tables = insert_order.len(), rows = total_rows, "starting copy run");

        let copier = RowCopyEngine {
            source: self.source.executor.as_ref(),
            destination: self.destination.executor.as_ref(),
            source_dialect,
            destination_dialect: dest_dialect,
            config: &self.config,
            listeners: &self.listeners,
        };

        for (position, &i) in insert_order.iter().enumerate() {
            if *cancel.borrow() {
                tally.cancelled = true;
                break;
            }
            let table = &source_schema.tables[i];
            let Some(dest_table) = dest_schema.table_by_map_name(&table.map_name) else {
                self.listeners
                    .table_started(&table.name, false, position + 1, insert_order.len());
                overall.credit(table.row_count, &self.listeners);
                self.listeners
                    .table_skipped(&table.name, "no matching destination table");
                tally.tables_skipped += 1;
                continue;
            };
            self.listeners
                .table_started(&table.name, true, position + 1, insert_order.len());

            match copier
                .copy_table(
                    &mut translations,
                    &mut overall,
                    &source_schema,
                    table,
                    dest_table,
                    &cancel,
                )
                .await
            {
                Ok(outcome) => {
                    tally.rows_processed += outcome.rows;
                    tally.rows_failed += outcome.rows_failed;
                    if outcome.skipped {
                        tally.tables_skipped += 1;
                    } else {
                        tally.tables_succeeded += 1;
                    }
                }
                Err(MoveError::Cancelled) => {
                    tally.cancelled = true;
                    break;
                }
                Err(e) => {
                    self.listeners
                        .statement_failed(&table.name, "", &e.to_string());
                    tally.failed_tables.push(table.name.clone());
                }
            }
        }

        let result = tally.finish();
        info!(run_id = %result.run_id, status = ?result.status, rows = result.rows_processed, "copy run finished");
        Ok(result)
    }

    /// Delete destination rows in delete-safe (reverse dependency) order.
    ///
    /// The set of rows to delete and the dependency knowledge come from the
    /// authority side: the source when `use_source_referential_integrity` is
    /// set, otherwise the destination itself.
    pub async fn delete_rows(
        &self,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<MigrationResult> {
        let (source_schema, dest_schema) = self.analyze().await?;
        let source_dialect = Dialect::new(source_schema.database_type);
        let dest_dialect = Dialect::new(dest_schema.database_type);

        let authority_is_source = self.config.use_source_referential_integrity;
        let (mut authority_schema, authority_executor, authority_dialect) = if authority_is_source
        {
            (source_schema, self.source.executor.clone(), source_dialect)
        } else {
            (
                dest_schema.clone(),
                self.destination.executor.clone(),
                dest_dialect,
            )
        };
        self.count_rows(
            authority_executor.as_ref(),
            authority_dialect,
            &mut authority_schema,
        )
        .await;

        let delete_order = order::delete_order(&authority_schema.tables);
        if delete_order.is_empty() {
            return Err(MoveError::config("no tables to process after analysis"));
        }

        let cancel = cancel.unwrap_or_else(|| watch::channel(false).1);

        let total_rows: i64 = delete_order
            .iter()
            .map(|&i| authority_schema.tables[i].row_count)
            .sum();
        let mut overall = OverallProgress::new(total_rows);
        let mut tally = RunTally::start(delete_order.len());
        info!(run_id = %tally.run_id, tables = delete_order.len(), rows = total_rows, "starting delete run");

        let deleter = RowDeleteEngine {
            authority: authority_executor.as_ref(),
            destination: self.destination.executor.as_ref(),
            authority_dialect,
            destination_dialect: dest_dialect,
            config: &self.config,
            listeners: &self.listeners,
        };

        for (position, &i) in delete_order.iter().enumerate() {
            if *cancel.borrow() {
                tally.cancelled = true;
                break;
            }
            let authority_table = &authority_schema.tables[i];
            let dest_table = if authority_is_source {
                match dest_schema.table_by_map_name(&authority_table.map_name) {
                    Some(t) => t,
                    None => {
                        self.listeners.table_started(
                            &authority_table.name,
                            false,
                            position + 1,
                            delete_order.len(),
                        );
                        overall.credit(authority_table.row_count, &self.listeners);
                        self.listeners
                            .table_skipped(&authority_table.name, "no matching destination table");
                        tally.tables_skipped += 1;
                        continue;
                    }
                }
            } else {
                authority_table
            };
            self.listeners.table_started(
                &dest_table.name,
                true,
                position + 1,
                delete_order.len(),
            );

            match deleter
                .delete_table(&mut overall, authority_table, dest_table, &cancel)
                .await
            {
                Ok(outcome) => {
                    tally.rows_processed += outcome.rows;
                    tally.rows_failed += outcome.rows_failed;
                    if outcome.skipped {
                        tally.tables_skipped += 1;
                    } else {
                        tally.tables_succeeded += 1;
                    }
                }
                Err(MoveError::Cancelled) => {
                    tally.cancelled = true;
                    break;
                }
                Err(e) => {
                    self.listeners
                        .statement_failed(&dest_table.name, "", &e.to_string());
                    tally.failed_tables.push(dest_table.name.clone());
                }
            }
        }

        let result = tally.finish();
        info!(run_id = %result.run_id, status = ?result.status, rows = result.rows_processed, "delete run finished");
        Ok(result)
    }

    /// Populate row counts for the processed tables of one schema. A failed
    /// count is reported and leaves the count at zero; progress totals
    /// degrade, the run does not.
    async fn count_rows(
        &self,
        executor: &dyn SqlExecutor,
        dialect: Dialect,
        schema: &mut Schema,
    ) {
        let timeout = self.config.timeout();
        for table in schema.tables.iter_mut().filter(|t| t.process) {
            let sql = format!("SELECT COUNT(*) FROM {}", dialect.quote_ident(&table.name));
            match executor.execute_scalar(&sql, timeout).await {
                Ok(value) => {
                    table.row_count = value.and_then(|v| v.as_i64()).unwrap_or(0);
                }
                Err(e) => {
                    self.listeners
                        .statement_failed(&table.name, &sql, &e.to_string());
                }
            }
        }
    }
}
