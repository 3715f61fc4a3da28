//! Error types for the row migration library.

use thiserror::Error;

/// Main error type for migration operations.
///
/// Only two failures are fatal before any statement executes: an empty table
/// set after analysis ([`MoveError::Config`]) and an unresolvable dependency
/// cycle ([`MoveError::DependencyCycle`]). Per-statement failures are reported
/// through the listener surface and never cross the top-level run boundary.
#[derive(Error, Debug)]
pub enum MoveError {
    /// Configuration error (invalid option combination, no tables to process).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Foreign keys across distinct tables form a cycle; no insert-safe
    /// ordering exists.
    #[error("Unresolvable foreign key dependency cycle: {0}")]
    DependencyCycle(String),

    /// A SQL statement failed at the execution interface.
    #[error("SQL execution error: {0}")]
    Sql(String),

    /// IO error (bulk staging file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration parse error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled between rows.
    #[error("Migration cancelled")]
    Cancelled,
}

impl MoveError {
    /// Create a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        MoveError::Config(message.into())
    }

    /// Create a Sql error.
    pub fn sql(message: impl Into<String>) -> Self {
        MoveError::Sql(message.into())
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MoveError>;
