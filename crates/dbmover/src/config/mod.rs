//! Migration configuration with serde defaults and YAML loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MoveError, Result};

/// Behavior configuration for a migration run.
///
/// Every field has a default so a config file only needs to name the options
/// it changes. Loadable from YAML via [`MigrationConfig::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Use the bulk-load path for eligible tables instead of per-row inserts.
    pub attempt_bulk_insert: bool,

    /// Force the bulk-load path even for tables whose auto-increment values
    /// are referenced by foreign keys (skips per-row identity translation).
    pub force_bulk_insert: bool,

    /// Field terminator for the bulk staging file (default: tab).
    pub bulk_insert_field_terminator: String,

    /// Row terminator for the bulk staging file (default: newline).
    pub bulk_insert_row_terminator: String,

    /// Encoding hint passed to the dialect's bulk-load statement
    /// (e.g. a code page for SQL Server).
    pub bulk_insert_encoding: Option<String>,

    /// Directory for bulk staging files. Defaults to the system temp dir.
    pub bulk_insert_staging_path: Option<PathBuf>,

    /// Replacement for literal terminator occurrences inside data values
    /// (default: a single space).
    pub delimiter_replacement: String,

    /// Clear all destination tables (child-to-parent order) before copying.
    pub clear_destination_tables: bool,

    /// Prefer TRUNCATE over DELETE when clearing unreferenced tables.
    pub attempt_truncate_table: bool,

    /// Attempt TRUNCATE even for tables referenced by foreign keys.
    pub force_truncate_table: bool,

    /// Write the source's auto-increment values into the destination instead
    /// of letting the destination assign new ones.
    pub preserve_auto_increment_values: bool,

    /// For deletes, take primary-key authority from the source schema
    /// (true, default) or the destination schema (false).
    pub use_source_referential_integrity: bool,

    /// Fire the per-table row progress callback every N rows.
    pub row_report_interval: u64,

    /// Statement timeout in seconds.
    pub timeout_seconds: u64,

    /// Only process tables with these names (case-insensitive). Empty means
    /// all tables.
    pub include_tables: Vec<String>,

    /// Never process tables with these names (case-insensitive).
    pub exclude_tables: Vec<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            attempt_bulk_insert: false,
            force_bulk_insert: false,
            bulk_insert_field_terminator: "\t".to_string(),
            bulk_insert_row_terminator: "\n".to_string(),
            bulk_insert_encoding: None,
            bulk_insert_staging_path: None,
            delimiter_replacement: " ".to_string(),
            clear_destination_tables: false,
            attempt_truncate_table: false,
            force_truncate_table: false,
            preserve_auto_increment_values: false,
            use_source_referential_integrity: true,
            row_report_interval: 100,
            timeout_seconds: 30,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
        }
    }
}

impl MigrationConfig {
    /// Load configuration from a YAML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: MigrationConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate option combinations.
    pub fn validate(&self) -> Result<()> {
        if self.bulk_insert_field_terminator.is_empty() {
            return Err(MoveError::config("bulk_insert_field_terminator must not be empty"));
        }
        if self.bulk_insert_row_terminator.is_empty() {
            return Err(MoveError::config("bulk_insert_row_terminator must not be empty"));
        }
        if self.bulk_insert_field_terminator == self.bulk_insert_row_terminator {
            return Err(MoveError::config(
                "bulk insert field and row terminators must differ",
            ));
        }
        if self.delimiter_replacement.contains(&self.bulk_insert_field_terminator)
            || self.delimiter_replacement.contains(&self.bulk_insert_row_terminator)
        {
            return Err(MoveError::config(
                "delimiter_replacement must not contain a bulk insert terminator",
            ));
        }
        if self.row_report_interval == 0 {
            return Err(MoveError::config("row_report_interval must be at least 1"));
        }
        if self.timeout_seconds == 0 {
            return Err(MoveError::config("timeout_seconds must be at least 1"));
        }
        Ok(())
    }

    /// Statement timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Directory used for bulk staging files.
    pub fn staging_dir(&self) -> PathBuf {
        self.bulk_insert_staging_path
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Whether a table name passes the include/exclude filters.
    pub fn should_process(&self, table: &str) -> bool {
        let matches = |names: &[String]| names.iter().any(|n| n.eq_ignore_ascii_case(table));
        if matches(&self.exclude_tables) {
            return false;
        }
        self.include_tables.is_empty() || matches(&self.include_tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MigrationConfig::default();
        assert_eq!(config.bulk_insert_field_terminator, "\t");
        assert_eq!(config.bulk_insert_row_terminator, "\n");
        assert_eq!(config.delimiter_replacement, " ");
        assert!(config.use_source_referential_integrity);
        assert_eq!(config.row_report_interval, 100);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = r#"
attempt_bulk_insert: true
bulk_insert_field_terminator: "|"
clear_destination_tables: true
row_report_interval: 50
"#;
        let config: MigrationConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.attempt_bulk_insert);
        assert_eq!(config.bulk_insert_field_terminator, "|");
        assert!(config.clear_destination_tables);
        assert_eq!(config.row_report_interval, 50);
        // Unset fields keep their defaults
        assert_eq!(config.bulk_insert_row_terminator, "\n");
        assert!(!config.force_bulk_insert);
    }

    #[test]
    fn test_validate_rejects_equal_terminators() {
        let config = MigrationConfig {
            bulk_insert_field_terminator: ",".to_string(),
            bulk_insert_row_terminator: ",".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_replacement_containing_terminator() {
        let config = MigrationConfig {
            delimiter_replacement: "\t".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_include_exclude_filters() {
        let config = MigrationConfig {
            include_tables: vec!["Orders".to_string()],
            exclude_tables: vec!["AuditLog".to_string()],
            ..Default::default()
        };
        assert!(config.should_process("orders"));
        assert!(!config.should_process("Customers"));
        assert!(!config.should_process("auditlog"));

        let open = MigrationConfig::default();
        assert!(open.should_process("anything"));
    }
}
