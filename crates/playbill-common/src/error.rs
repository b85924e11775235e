//! Error types for Playbill

use thiserror::Error;

/// Result type alias for Playbill operations
pub type Result<T> = std::result::Result<T, PlaybillError>;

/// Main error type for Playbill
///
/// The `NotFound` / `Unavailable` / `UploadFailed` / `PersistenceAnomaly`
/// variants carry the ingestion failure taxonomy: `NotFound` is never retried,
/// `Unavailable` means the caller may retry the whole run later, and the
/// remaining two abort the run.
#[derive(Error, Debug)]
pub enum PlaybillError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Persistence anomaly: {0}")]
    PersistenceAnomaly(String),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PlaybillError {
    /// Whether a later retry of the whole run could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlaybillError::Unavailable(_) | PlaybillError::Network(_))
    }
}
