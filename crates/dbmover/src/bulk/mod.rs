//! Bulk-load staging: renders rows into a delimited file consumed by a single
//! set-based load statement.
//!
//! The staging file handle is exclusively owned here for the duration of one
//! table's pass and is always closed before the load statement runs, on the
//! error path included.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::config::MigrationConfig;
use crate::error::Result;

/// How many times staging-file removal retries while the file is still
/// locked by the load statement's reader.
const REMOVE_ATTEMPTS: u32 = 10;
const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Writer for one table's staging file.
pub struct BulkStage {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    field_terminator: String,
    row_terminator: String,
    replacement: String,
    rows: u64,
}

impl BulkStage {
    /// Create the staging file for a table under the configured staging
    /// directory.
    pub async fn create(table: &str, config: &MigrationConfig) -> Result<Self> {
        let file_name = format!("dbmover_{}_{}.dat", sanitize_file_name(table), uuid::Uuid::new_v4());
        let path = config.staging_dir().join(file_name);
        debug!(table, path = %path.display(), "creating bulk staging file");
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            field_terminator: config.bulk_insert_field_terminator.clone(),
            row_terminator: config.bulk_insert_row_terminator.clone(),
            replacement: config.delimiter_replacement.clone(),
            rows: 0,
        })
    }

    /// Path of the staging file, for the load statement.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows staged so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Replace literal terminator occurrences inside a data value so the
    /// staged row parses back to the original column count.
    pub fn sanitize(&self, value: &str) -> String {
        let mut out = value.replace(&self.field_terminator, &self.replacement);
        if self.row_terminator != self.field_terminator {
            out = out.replace(&self.row_terminator, &self.replacement);
        }
        out
    }

    /// Append one row of already-formatted field texts.
    pub async fn write_row(&mut self, fields: &[String]) -> Result<()> {
        // Render the full line before borrowing the writer.
        let mut line = String::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                line.push_str(&self.field_terminator);
            }
            line.push_str(&self.sanitize(field));
        }
        line.push_str(&self.row_terminator);

        let Some(writer) = self.writer.as_mut() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "staging file already closed",
            )
            .into());
        };
        writer.write_all(line.as_bytes()).await?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and close the file, returning its path. Must run before the
    /// load statement so no partial write is visible to the reader.
    pub async fn finish(mut self) -> Result<PathBuf> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.into_inner().sync_all().await?;
        }
        Ok(std::mem::take(&mut self.path))
    }

    /// Discard the stage on the error path: close the handle and make a
    /// best-effort removal.
    pub async fn discard(mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush().await;
        }
        let _ = tokio::fs::remove_file(&self.path).await;
    }
}

impl Drop for BulkStage {
    fn drop(&mut self) {
        // Guaranteed release of the handle even if neither finish nor
        // discard ran; the file itself is cleaned up by remove_staging_file.
        self.writer.take();
    }
}

/// Remove a staging file after the load, waiting out any outstanding file
/// lock with a bounded retry. Returns an error message for the caller to
/// report as a non-fatal warning; removal failure never aborts a migration.
pub async fn remove_staging_file(path: &Path) -> std::result::Result<(), String> {
    let mut last_error = String::new();
    for attempt in 1..=REMOVE_ATTEMPTS {
        match tokio::fs::remove_file(path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                last_error = e.to_string();
                warn!(
                    path = %path.display(),
                    attempt,
                    error = %e,
                    "staging file still locked, retrying removal"
                );
                tokio::time::sleep(REMOVE_RETRY_DELAY).await;
            }
        }
    }
    Err(format!(
        "could not remove staging file {} after {} attempts: {} (manual cleanup required)",
        path.display(),
        REMOVE_ATTEMPTS,
        last_error
    ))
}

fn sanitize_file_name(table: &str) -> String {
    table
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> MigrationConfig {
        MigrationConfig {
            bulk_insert_staging_path: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stage_write_and_parse_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let mut stage = BulkStage::create("Orders", &config).await.unwrap();
        stage
            .write_row(&["1".to_string(), "alpha".to_string(), "".to_string()])
            .await
            .unwrap();
        stage
            .write_row(&["2".to_string(), "beta".to_string(), "42".to_string()])
            .await
            .unwrap();
        assert_eq!(stage.rows(), 2);

        let path = stage.finish().await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = content.split('\n').filter(|r| !r.is_empty()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].split('\t').count(), 3);
        assert_eq!(rows[1], "2\tbeta\t42");
    }

    #[tokio::test]
    async fn test_terminator_collision_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let mut stage = BulkStage::create("Notes", &config).await.unwrap();
        // A data value containing both terminators must not change the
        // staged column count
        stage
            .write_row(&["1".to_string(), "has\ttab and\nnewline".to_string()])
            .await
            .unwrap();
        let path = stage.finish().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = content.split('\n').filter(|r| !r.is_empty()).collect();
        assert_eq!(rows.len(), 1);
        let fields: Vec<&str> = rows[0].split('\t').collect();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1], "has tab and newline");
    }

    #[tokio::test]
    async fn test_finish_returns_stage_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let mut stage = BulkStage::create("Orders", &config).await.unwrap();
        let expected = stage.path().to_path_buf();
        // Sanitization happens inline while the row is being appended
        stage
            .write_row(&["1".to_string(), "a\tb".to_string()])
            .await
            .unwrap();
        let path = stage.finish().await.unwrap();
        assert_eq!(path, expected);
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\ta b\n");
    }

    #[tokio::test]
    async fn test_remove_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage.dat");
        std::fs::write(&path, "x").unwrap();
        remove_staging_file(&path).await.unwrap();
        assert!(!path.exists());
        // Removing an already-missing file is not an error
        remove_staging_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let stage = BulkStage::create("Tmp", &config).await.unwrap();
        let path = stage.path().to_path_buf();
        stage.discard().await;
        assert!(!path.exists());
    }
}
