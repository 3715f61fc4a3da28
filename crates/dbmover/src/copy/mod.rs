//! Row copy engine: streams source rows, dereferences foreign keys through
//! the translation store, and writes each row to the destination by INSERT,
//! update-or-insert reconciliation, or the bulk staging path.
//!
//! Strictly sequential per table: every destination statement completes
//! before the next source row is read, because later rows may depend on the
//! translation state produced by earlier ones.

use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bulk::{self, BulkStage};
use crate::config::MigrationConfig;
use crate::core::schema::{FieldType, Schema, Table};
use crate::core::traits::SqlExecutor;
use crate::core::value::SqlValue;
use crate::dialect::{Dialect, ExplicitIdentityMode};
use crate::error::{MoveError, Result};
use crate::progress::{Listeners, OverallProgress};
use crate::translate::TranslationStore;

/// Iterations between identity-sync progress reports on long gaps.
const IDENTITY_SYNC_REPORT_EVERY: i64 = 100;

/// One column of the working field list: the intersection of source and
/// destination fields participating in a table's pass.
#[derive(Debug, Clone)]
pub(crate) struct WorkField {
    /// Index into the source table's fields.
    pub source_index: usize,
    /// Source field name, used in the source SELECT.
    pub name: String,
    /// Destination column name (may differ in case).
    pub dest_name: String,
    /// Source-side type tag, used for defaults and bulk formatting.
    pub field_type: FieldType,
    /// Destination nullability.
    pub allows_nulls: bool,
    /// Primary key on either side.
    pub is_primary_key: bool,
    /// Destination auto-increment column.
    pub dest_auto_increment: bool,
}

/// Build the working field list: fields present by name on both sides,
/// excluding binary/large-object types.
pub(crate) fn intersect_fields(source: &Table, destination: &Table) -> Vec<WorkField> {
    source
        .fields
        .iter()
        .enumerate()
        .filter_map(|(i, sf)| {
            let df = destination.field(&sf.name)?;
            if sf.field_type.is_binary() || df.field_type.is_binary() {
                return None;
            }
            Some(WorkField {
                source_index: i,
                name: sf.name.clone(),
                dest_name: df.name.clone(),
                field_type: sf.field_type,
                allows_nulls: df.allows_nulls,
                is_primary_key: sf.is_primary_key || df.is_primary_key,
                dest_auto_increment: df.auto_increment,
            })
        })
        .collect()
}

/// How the destination's auto-increment column is handled for one table.
#[derive(Debug, Clone, Copy, PartialEq)]
enum IdentityMode {
    /// Destination assigns values; translation via identity read-back.
    AssignedByDestination,
    /// Source values are written explicitly. `needs_mode_toggle` is true
    /// when a session mode was enabled and must be disabled afterwards.
    Explicit { needs_mode_toggle: bool },
    /// Source values are reached by re-inserting and deleting rows until
    /// the destination counter catches up.
    ManualSync,
}

/// Outcome of one table's copy or delete pass.
#[derive(Debug, Clone, Default)]
pub(crate) struct TableOutcome {
    /// Rows written (or staged and loaded) successfully.
    pub rows: i64,
    /// Rows whose statement failed; reported, not fatal.
    pub rows_failed: i64,
    /// The table was skipped entirely.
    pub skipped: bool,
}

pub(crate) struct RowCopyEngine<'a> {
    pub source: &'a dyn SqlExecutor,
    pub destination: &'a dyn SqlExecutor,
    pub source_dialect: Dialect,
    pub destination_dialect: Dialect,
    pub config: &'a MigrationConfig,
    pub listeners: &'a Listeners,
}

impl<'a> RowCopyEngine<'a> {
    /// Copy all rows of one table pair.
    pub async fn copy_table(
        &self,
        translations: &mut TranslationStore,
        overall: &mut OverallProgress,
        source_schema: &Schema,
        source_table: &Table,
        dest_table: &Table,
        cancel: &watch::Receiver<bool>,
    ) -> Result<TableOutcome> {
        let timeout = self.config.timeout();
        let table_name = dest_table.name.clone();
        let total = source_table.row_count;

        let work = intersect_fields(source_table, dest_table);
        if work.is_empty() {
            overall.credit(total, self.listeners);
            self.listeners
                .table_skipped(&table_name, "no common fields between source and destination");
            return Ok(TableOutcome {
                skipped: true,
                ..Default::default()
            });
        }

        // The tracked auto-increment field, when present in the working set.
        let auto_idx = source_table.auto_inc_field().and_then(|f| {
            work.iter()
                .position(|w| w.name.eq_ignore_ascii_case(&f.name) && w.dest_auto_increment)
        });
        // Translation is only maintained for tables whose identity is
        // referenced by foreign keys elsewhere (self-references included).
        let track = auto_idx.is_some() && source_table.referenced_by_foreign_keys;

        let self_ref = source_table.self_reference_field();

        let mut identity_mode = self
            .resolve_identity_mode(&table_name, auto_idx.is_some(), self_ref.is_some(), timeout)
            .await;

        // Bulk load is eligible when the dialect supports it and either the
        // caller forces it or no per-row identity translation is needed.
        let needs_translation =
            track && matches!(identity_mode, IdentityMode::AssignedByDestination);
        let mut use_bulk = self.config.attempt_bulk_insert
            && self.destination_dialect.supports_bulk_insert()
            && (self.config.force_bulk_insert || !needs_translation);
        if use_bulk && identity_mode == IdentityMode::ManualSync {
            if self.config.force_bulk_insert {
                self.listeners.warning(&format!(
                    "{}: forced bulk insert abandons auto-increment preservation",
                    table_name
                ));
                identity_mode = IdentityMode::AssignedByDestination;
            } else {
                use_bulk = false;
            }
        }

        let select = self.build_select(source_table, &work, self_ref.map(|f| f.name.as_str()), auto_idx);
        debug!(table = %table_name, sql = %select, bulk = use_bulk, "starting table copy");
        let mut cursor = self.source.open_cursor(&select, timeout).await?;

        let mut stage = if use_bulk {
            Some(BulkStage::create(&table_name, self.config).await?)
        } else {
            None
        };

        let mut outcome = TableOutcome::default();
        let mut processed: i64 = 0;
        self.listeners.row_progress(&table_name, 0, total);

        let loop_result: Result<()> = async {
            loop {
                // Cooperative cancellation at row boundaries only.
                if *cancel.borrow() {
                    return Err(MoveError::Cancelled);
                }
                let Some(row) = cursor.next_row().await? else {
                    break;
                };
                let mut values = row;
                values.resize(work.len(), SqlValue::Null);

                // Dereference foreign keys through the translation maps,
                // then apply null/sentinel encoding.
                for (i, w) in work.iter().enumerate() {
                    let source_field = &source_table.fields[w.source_index];
                    if source_field.is_foreign_key() {
                        values[i] = translations.dereference(
                            source_schema,
                            source_table,
                            source_field,
                            &values[i],
                        );
                    }
                }
                let source_identity = auto_idx.and_then(|i| values[i].as_i64());
                for (i, w) in work.iter().enumerate() {
                    let source_field = &source_table.fields[w.source_index];
                    if values[i].is_null() && !w.allows_nulls {
                        values[i] = SqlValue::non_null_default(w.field_type);
                    } else if source_field.is_foreign_key()
                        && w.allows_nulls
                        && values[i] == SqlValue::non_null_default(w.field_type)
                    {
                        values[i] = SqlValue::Null;
                    }
                }

                if let Some(stage) = stage.as_mut() {
                    let texts: Vec<String> = work
                        .iter()
                        .zip(&values)
                        .map(|(w, v)| v.to_bulk_text(w.field_type))
                        .collect();
                    stage.write_row(&texts).await?;
                    if track {
                        // Staged values are loaded verbatim
                        if let Some(sv) = source_identity {
                            if let Some(i) = auto_idx {
                                translations.record(
                                    &source_table.map_name,
                                    &work[i].name,
                                    sv,
                                    sv,
                                );
                            }
                        }
                    }
                    outcome.rows += 1;
                } else {
                    self.write_row(
                        translations,
                        source_table,
                        dest_table,
                        &work,
                        auto_idx,
                        track,
                        identity_mode,
                        &values,
                        source_identity,
                        &mut outcome,
                    )
                    .await;
                }

                processed += 1;
                overall.step(self.listeners);
                if processed % self.config.row_report_interval as i64 == 0 {
                    self.listeners.row_progress(&table_name, processed, total);
                }
            }
            Ok(())
        }
        .await;

        // Identity-insert mode is session state: always switch it back off,
        // on the error path included.
        if let IdentityMode::Explicit {
            needs_mode_toggle: true,
        } = identity_mode
        {
            if let Some(off) = self.destination_dialect.identity_insert_off(&table_name) {
                if let Err(e) = self.destination.execute(&off, timeout).await {
                    self.listeners
                        .statement_failed(&table_name, &off, &e.to_string());
                }
            }
        }

        if let Err(e) = loop_result {
            if let Some(stage) = stage.take() {
                stage.discard().await;
            }
            return Err(e);
        }

        if let Some(stage) = stage.take() {
            self.run_bulk_load(&table_name, stage, &mut outcome).await?;
        }

        self.listeners
            .row_progress(&table_name, processed, total.max(processed));
        info!(
            table = %table_name,
            rows = outcome.rows,
            failed = outcome.rows_failed,
            "table copy finished"
        );
        Ok(outcome)
    }

    /// Decide how the destination's auto-increment column is driven.
    async fn resolve_identity_mode(
        &self,
        table_name: &str,
        has_auto_inc: bool,
        self_referencing: bool,
        timeout: std::time::Duration,
    ) -> IdentityMode {
        // Identity preservation needs insertion order freedom the
        // self-reference row ordering does not allow.
        if !self.config.preserve_auto_increment_values || !has_auto_inc || self_referencing {
            return IdentityMode::AssignedByDestination;
        }
        match self.destination_dialect.explicit_identity_mode() {
            ExplicitIdentityMode::Unrestricted => IdentityMode::Explicit {
                needs_mode_toggle: false,
            },
            ExplicitIdentityMode::RequiresMode => {
                let Some(on) = self.destination_dialect.identity_insert_on(table_name) else {
                    return IdentityMode::ManualSync;
                };
                match self.destination.execute(&on, timeout).await {
                    Ok(_) => IdentityMode::Explicit {
                        needs_mode_toggle: true,
                    },
                    Err(e) => {
                        warn!(table = table_name, error = %e, "identity insert denied, falling back to manual synchronization");
                        self.listeners.warning(&format!(
                            "{}: identity insert denied ({}); using manual identity synchronization",
                            table_name, e
                        ));
                        IdentityMode::ManualSync
                    }
                }
            }
            ExplicitIdentityMode::Unsupported => IdentityMode::ManualSync,
        }
    }

    fn build_select(
        &self,
        source_table: &Table,
        work: &[WorkField],
        self_ref_column: Option<&str>,
        auto_idx: Option<usize>,
    ) -> String {
        let cols = work
            .iter()
            .map(|w| self.source_dialect.quote_ident(&w.name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "SELECT {} FROM {}",
            cols,
            self.source_dialect.quote_ident(&source_table.name)
        );
        if let Some(col) = self_ref_column {
            // Referenced rows must be read before the rows referencing them
            sql.push_str(&format!(
                " ORDER BY {}",
                self.source_dialect.self_reference_order_expr(col)
            ));
        } else if let Some(i) = auto_idx {
            // Ordered identity insertion keeps destination assignment in
            // the same relative order as the source
            sql.push_str(&format!(
                " ORDER BY {}",
                self.source_dialect.quote_ident(&work[i].name)
            ));
        }
        sql
    }

    /// WHERE clause over the primary-key fields with non-null encoded
    /// values, or `None` when no usable key exists.
    fn build_where(&self, work: &[WorkField], values: &[SqlValue]) -> Option<String> {
        let predicates: Vec<String> = work
            .iter()
            .zip(values)
            .filter(|(w, v)| w.is_primary_key && !v.is_null())
            .map(|(w, v)| {
                format!(
                    "{} = {}",
                    self.destination_dialect.quote_ident(&w.dest_name),
                    v.to_sql_literal(&self.destination_dialect)
                )
            })
            .collect();
        if predicates.is_empty() {
            None
        } else {
            Some(predicates.join(" AND "))
        }
    }

    fn build_insert(
        &self,
        dest_table: &Table,
        work: &[WorkField],
        values: &[SqlValue],
        include_auto_increment: bool,
    ) -> String {
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        for (w, v) in work.iter().zip(values) {
            if w.dest_auto_increment && !include_auto_increment {
                continue;
            }
            cols.push(self.destination_dialect.quote_ident(&w.dest_name));
            vals.push(v.to_sql_literal(&self.destination_dialect));
        }
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.destination_dialect.quote_ident(&dest_table.name),
            cols.join(", "),
            vals.join(", ")
        )
    }

    /// UPDATE of all non-key columns, or `None` when only key columns exist.
    fn build_update(
        &self,
        dest_table: &Table,
        work: &[WorkField],
        values: &[SqlValue],
        where_clause: &str,
    ) -> Option<String> {
        let assignments: Vec<String> = work
            .iter()
            .zip(values)
            .filter(|(w, _)| !w.is_primary_key && !w.dest_auto_increment)
            .map(|(w, v)| {
                format!(
                    "{} = {}",
                    self.destination_dialect.quote_ident(&w.dest_name),
                    v.to_sql_literal(&self.destination_dialect)
                )
            })
            .collect();
        if assignments.is_empty() {
            return None;
        }
        Some(format!(
            "UPDATE {} SET {} WHERE {}",
            self.destination_dialect.quote_ident(&dest_table.name),
            assignments.join(", "),
            where_clause
        ))
    }

    /// Write one row by insert or update-or-insert reconciliation, recording
    /// the identity translation on success. Statement failures are reported
    /// and counted; they never abort the table.
    #[allow(clippy::too_many_arguments)]
    async fn write_row(
        &self,
        translations: &mut TranslationStore,
        source_table: &Table,
        dest_table: &Table,
        work: &[WorkField],
        auto_idx: Option<usize>,
        track: bool,
        identity_mode: IdentityMode,
        values: &[SqlValue],
        source_identity: Option<i64>,
        outcome: &mut TableOutcome,
    ) {
        let timeout = self.config.timeout();
        let table_name = &dest_table.name;

        // Without a usable primary key no WHERE clause can be built and the
        // engine always inserts directly. With one, destination emptiness is
        // never assumed: triggers may have pre-populated rows.
        let where_clause = self.build_where(work, values);
        let exists = match &where_clause {
            Some(clause) => {
                let count_sql = format!(
                    "SELECT COUNT(*) FROM {} WHERE {}",
                    self.destination_dialect.quote_ident(table_name),
                    clause
                );
                match self.destination.execute_scalar(&count_sql, timeout).await {
                    Ok(v) => v.and_then(|x| x.as_i64()).unwrap_or(0) > 0,
                    Err(e) => {
                        self.listeners
                            .statement_failed(table_name, &count_sql, &e.to_string());
                        outcome.rows_failed += 1;
                        return;
                    }
                }
            }
            None => false,
        };

        if exists {
            let clause = where_clause.as_deref().unwrap_or_default();
            match self.build_update(dest_table, work, values, clause) {
                Some(update_sql) => {
                    match self.destination.execute(&update_sql, timeout).await {
                        Ok(_) => outcome.rows += 1,
                        Err(e) => {
                            self.listeners
                                .statement_failed(table_name, &update_sql, &e.to_string());
                            outcome.rows_failed += 1;
                            return;
                        }
                    }
                }
                // Nothing beyond the key to update
                None => outcome.rows += 1,
            }
            if track {
                if let Some(sv) = source_identity {
                    // The matched destination row already carries this key
                    if let Some(i) = auto_idx {
                        translations.record(&source_table.map_name, &work[i].name, sv, sv);
                    }
                }
            }
            return;
        }

        let include_auto = matches!(identity_mode, IdentityMode::Explicit { .. });
        let insert_sql = self.build_insert(dest_table, work, values, include_auto);

        if identity_mode == IdentityMode::ManualSync {
            self.insert_with_identity_sync(
                translations,
                source_table,
                dest_table,
                work,
                auto_idx,
                track,
                &insert_sql,
                source_identity,
                outcome,
            )
            .await;
            return;
        }

        match self.destination.execute(&insert_sql, timeout).await {
            Ok(_) => {
                outcome.rows += 1;
                if track {
                    if let (Some(sv), Some(i)) = (source_identity, auto_idx) {
                        let dest_value = if include_auto {
                            // Explicit values pass through unchanged
                            Some(sv)
                        } else {
                            self.read_back_identity(dest_table, &work[i].dest_name, timeout)
                                .await
                                .or(Some(sv))
                        };
                        if let Some(dv) = dest_value {
                            translations.record(&source_table.map_name, &work[i].name, sv, dv);
                        }
                    }
                }
            }
            Err(e) => {
                self.listeners
                    .statement_failed(table_name, &insert_sql, &e.to_string());
                outcome.rows_failed += 1;
            }
        }
    }

    /// Read back the identity value the destination assigned to the most
    /// recent insert. `None` when the dialect has no read-back query, in
    /// which case the caller records the translation pass-through.
    async fn read_back_identity(
        &self,
        dest_table: &Table,
        field: &str,
        timeout: std::time::Duration,
    ) -> Option<i64> {
        let query = self
            .destination_dialect
            .identity_query(&dest_table.name, field)?;
        match self.destination.execute_scalar(&query, timeout).await {
            Ok(v) => v.and_then(|x| x.as_i64()),
            Err(e) => {
                self.listeners
                    .statement_failed(&dest_table.name, &query, &e.to_string());
                None
            }
        }
    }

    /// Manual identity synchronization: insert the row, and while the
    /// assigned value is still below the source value, delete it and insert
    /// again until the destination counter reaches the target.
    #[allow(clippy::too_many_arguments)]
    async fn insert_with_identity_sync(
        &self,
        translations: &mut TranslationStore,
        source_table: &Table,
        dest_table: &Table,
        work: &[WorkField],
        auto_idx: Option<usize>,
        track: bool,
        insert_sql: &str,
        source_identity: Option<i64>,
        outcome: &mut TableOutcome,
    ) {
        let timeout = self.config.timeout();
        let table_name = &dest_table.name;
        let (Some(target), Some(i)) = (source_identity, auto_idx) else {
            // No identity to synchronize with: plain insert
            match self.destination.execute(insert_sql, timeout).await {
                Ok(_) => outcome.rows += 1,
                Err(e) => {
                    self.listeners
                        .statement_failed(table_name, insert_sql, &e.to_string());
                    outcome.rows_failed += 1;
                }
            }
            return;
        };
        let auto_col = &work[i].dest_name;

        let mut iterations: i64 = 0;
        loop {
            if let Err(e) = self.destination.execute(insert_sql, timeout).await {
                self.listeners
                    .statement_failed(table_name, insert_sql, &e.to_string());
                outcome.rows_failed += 1;
                return;
            }
            let Some(assigned) = self
                .read_back_identity(dest_table, auto_col, timeout)
                .await
            else {
                // Cannot observe the counter: keep the row as inserted
                outcome.rows += 1;
                if track {
                    translations.record(&source_table.map_name, &work[i].name, target, target);
                }
                return;
            };

            if assigned >= target {
                if assigned > target {
                    self.listeners.warning(&format!(
                        "{}: destination identity {} already past source value {}",
                        table_name, assigned, target
                    ));
                }
                outcome.rows += 1;
                if track {
                    translations.record(&source_table.map_name, &work[i].name, target, assigned);
                }
                return;
            }

            // Placeholder: remove it and let the counter advance
            let delete_sql = format!(
                "DELETE FROM {} WHERE {} = {}",
                self.destination_dialect.quote_ident(table_name),
                self.destination_dialect.quote_ident(auto_col),
                assigned
            );
            if let Err(e) = self.destination.execute(&delete_sql, timeout).await {
                self.listeners
                    .statement_failed(table_name, &delete_sql, &e.to_string());
                outcome.rows_failed += 1;
                return;
            }

            iterations += 1;
            if iterations % IDENTITY_SYNC_REPORT_EVERY == 0 {
                self.listeners
                    .identity_sync_progress(table_name, assigned, target);
            }
        }
    }

    /// Finalize the bulk path: close the stage, run the load statement, and
    /// remove the staging file with a bounded retry.
    async fn run_bulk_load(
        &self,
        table_name: &str,
        stage: BulkStage,
        outcome: &mut TableOutcome,
    ) -> Result<()> {
        let staged_rows = stage.rows() as i64;
        let path = stage.finish().await?;
        let path_text = path.to_string_lossy().to_string();

        let Some(statement) = self.destination_dialect.bulk_insert_statement(
            table_name,
            &path_text,
            &self.config.bulk_insert_field_terminator,
            &self.config.bulk_insert_row_terminator,
            self.config.bulk_insert_encoding.as_deref(),
        ) else {
            // Eligibility was checked up front; this is unreachable in
            // practice but must not strand the staged file.
            let _ = bulk::remove_staging_file(&path).await;
            return Err(MoveError::config(format!(
                "destination dialect has no bulk load statement for table {}",
                table_name
            )));
        };

        self.listeners.bulk_insert_executing(table_name);
        let start = Instant::now();
        match self
            .destination
            .execute(&statement, self.config.timeout())
            .await
        {
            Ok(_) => {
                self.listeners
                    .bulk_insert_completed(table_name, start.elapsed().as_secs_f64());
            }
            Err(e) => {
                self.listeners
                    .bulk_insert_failed(table_name, &statement, &e.to_string());
                outcome.rows_failed += staged_rows;
                outcome.rows -= staged_rows;
            }
        }

        if let Err(message) = bulk::remove_staging_file(&path).await {
            self.listeners.warning(&message);
        }
        Ok(())
    }
}
