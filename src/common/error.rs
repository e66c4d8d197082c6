//! Error types for the notification harness
//!
//! Only conditions that invalidate the whole run live here. A scenario whose
//! record was processed too early or never processed is not an error, it is a
//! [`Failure`](crate::harness::Failure) recorded by the reporter.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Store Errors ===
    #[error("Store unavailable: {0}. Check the database URL and that Postgres is reachable")]
    StoreUnavailable(String),

    #[error("Invalid table name '{0}'. Expected an identifier like 'activity.notifications'")]
    InvalidTable(String),

    // === Run Errors ===
    #[error(
        "Run timed out after {:.1} seconds. The worker may be stuck; rerun from scratch",
        .0.as_secs_f64()
    )]
    RunTimeout(Duration),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid scenario file: {0}")]
    ScenarioParse(String),

    // === IO Errors ===
    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a file read error for a path
    pub fn file_read(path: &std::path::Path, error: impl ToString) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Whether this error means the observation channel is broken
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::StoreUnavailable(e.to_string())
    }
}
