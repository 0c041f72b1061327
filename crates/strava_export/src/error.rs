//! Error taxonomy for export passes.
//!
//! Configuration and authentication errors abort a pass. Everything else,
//! unexpected API statuses included, is caught by the orchestrator and
//! reported against the record or page it hit.

use chrono::{DateTime, Utc};
use strava_client::{ActivityId, StravaError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication rejected by the API: {0}")]
    Authentication(String),

    #[error("rate limit exceeded, budget resets at {retry_at}")]
    RateLimitExceeded { retry_at: DateTime<Utc> },

    #[error("activity {0} not found")]
    RecordNotFound(ActivityId),

    #[error("network error: {0}")]
    TransientNetwork(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("API error: {0}")]
    Api(String),
}

impl SyncError {
    /// Errors that end the pass instead of being recorded against one record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Configuration(_) | SyncError::Authentication(_))
    }
}

impl From<StravaError> for SyncError {
    fn from(err: StravaError) -> Self {
        if err.is_transient() {
            return SyncError::TransientNetwork(err.to_string());
        }
        match err {
            StravaError::Auth(body) => SyncError::Authentication(body),
            StravaError::Config(msg) => SyncError::Configuration(msg),
            StravaError::Decode(msg) => SyncError::InvalidRecord(msg),
            other => SyncError::Api(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Persistence(err.to_string())
    }
}

impl From<rusqlite_migration::Error> for SyncError {
    fn from(err: rusqlite_migration::Error) -> Self {
        SyncError::Persistence(format!("running migrations: {err}"))
    }
}

/// Result type alias for export operations.
pub type SyncResult<T> = Result<T, SyncError>;
