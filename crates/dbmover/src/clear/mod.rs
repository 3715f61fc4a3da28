//! Destination clearing pre-pass: empties destination tables in delete-safe
//! order before a copy run, by TRUNCATE where possible and DELETE otherwise.

use tracing::{debug, warn};

use crate::config::MigrationConfig;
use crate::core::schema::Schema;
use crate::core::traits::SqlExecutor;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::progress::Listeners;

pub(crate) struct ClearEngine<'a> {
    pub destination: &'a dyn SqlExecutor,
    pub dialect: Dialect,
    pub config: &'a MigrationConfig,
    pub listeners: &'a Listeners,
}

impl<'a> ClearEngine<'a> {
    /// Empty the given destination tables, `order` being indices into the
    /// schema in delete-safe (descending priority) order.
    ///
    /// Truncation is preferred when the dialect supports it and the table has
    /// no incoming foreign-key references, or when the caller forces it. The
    /// first denied TRUNCATE switches the whole run to DELETE; the denial
    /// usually comes from permissions or FK enforcement that will deny every
    /// later table too.
    pub async fn clear_tables(&self, schema: &Schema, order: &[usize]) -> Result<()> {
        let timeout = self.config.timeout();
        let mut truncate_denied = false;

        for &i in order {
            let table = &schema.tables[i];
            let name = &table.name;

            let try_truncate = !truncate_denied
                && self.dialect.supports_truncate()
                && (self.config.force_truncate_table
                    || (self.config.attempt_truncate_table && !table.referenced_by_foreign_keys));

            let mut cleared = false;
            if try_truncate {
                if let Some(truncate) = self.dialect.truncate_statement(name) {
                    match self.destination.execute(&truncate, timeout).await {
                        Ok(_) => {
                            debug!(table = %name, "destination table truncated");
                            cleared = true;
                        }
                        Err(e) => {
                            warn!(table = %name, error = %e, "truncate denied, using delete for the rest of the run");
                            self.listeners.warning(&format!(
                                "{}: truncate denied ({}); clearing by delete",
                                name, e
                            ));
                            truncate_denied = true;
                        }
                    }
                }
            }

            if !cleared {
                let delete = format!("DELETE FROM {}", self.dialect.quote_ident(name));
                match self.destination.execute(&delete, timeout).await {
                    Ok(_) => cleared = true,
                    Err(e) => {
                        self.listeners.statement_failed(name, &delete, &e.to_string());
                    }
                }
            }

            if cleared {
                // A DELETE leaves the identity counter where it was; reset it
                // so the destination assigns from the start again.
                if let Some(auto) = table.auto_inc_field() {
                    if let Some(reseed) = self.dialect.reseed_statement(name, &auto.name) {
                        if let Err(e) = self.destination.execute(&reseed, timeout).await {
                            self.listeners.statement_failed(name, &reseed, &e.to_string());
                        }
                    }
                }
                self.listeners.table_cleared(name);
            }
        }
        Ok(())
    }
}
