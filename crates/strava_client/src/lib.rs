//! Minimal `StravaClient` trait and the reqwest-based implementation used by the exporter.

use async_trait::async_trait;
use thiserror::Error;

pub mod config;
pub mod http_client;
pub mod rate_limit;
pub mod retry;

pub use rate_limit::RateLimitUsage;

/// Strava activity identifiers are 64-bit integers.
pub type ActivityId = i64;

#[derive(Debug, Error)]
pub enum StravaError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limit exceeded")]
    RateLimited { usage: Option<RateLimitUsage> },
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decoding response: {0}")]
    Decode(String),
}

impl StravaError {
    /// Connection-level failures and server-side errors are worth retrying;
    /// everything else will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            StravaError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            StravaError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A parsed payload plus the rate budget the server echoed with it.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse<T> {
    pub data: T,
    pub rate_limit: Option<RateLimitUsage>,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T, rate_limit: Option<RateLimitUsage>) -> Self {
        Self { data, rate_limit }
    }
}

/// Query for `GET /athlete/activities`. Bounds are epoch seconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListActivitiesQuery {
    pub after: Option<i64>,
    pub before: Option<i64>,
    pub per_page: Option<u32>,
    pub page: u32,
}

impl ListActivitiesQuery {
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(after) = self.after {
            pairs.push(("after", after.to_string()));
        }
        if let Some(before) = self.before {
            pairs.push(("before", before.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page", per_page.to_string()));
        }
        if self.page > 1 {
            pairs.push(("page", self.page.to_string()));
        }
        pairs
    }
}

#[async_trait]
pub trait StravaClient: Send + Sync + 'static {
    /// List the authenticated athlete's activity summaries, one page at a time.
    async fn list_activities(
        &self,
        query: &ListActivitiesQuery,
    ) -> Result<ApiResponse<Vec<serde_json::Value>>, StravaError>;

    /// Fetch the detailed representation of a single activity.
    async fn get_activity_details(
        &self,
        activity_id: ActivityId,
    ) -> Result<ApiResponse<serde_json::Value>, StravaError>;
}
