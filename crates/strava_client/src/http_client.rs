//! HTTP client implementation for the Strava API.
//!
//! This module provides a reqwest-based implementation of the [`StravaClient`](crate::StravaClient) trait.

use crate::{
    ActivityId, ApiResponse, ListActivitiesQuery, RateLimitUsage, StravaClient, StravaError,
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

/// Client for the Strava API using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestStravaClient {
    base_url: String,
    access_token: SecretString,
    client: reqwest::Client,
}

impl ReqwestStravaClient {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Strava API (e.g., "https://www.strava.com/api/v3")
    /// * `access_token` - OAuth access token sent as a bearer credential
    pub fn new(base_url: &str, access_token: SecretString) -> Result<Self, StravaError> {
        let client = reqwest::Client::builder().gzip(true).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            client,
        })
    }

    pub fn from_config(config: &crate::config::Config) -> Result<Self, StravaError> {
        Self::new(&config.base_url, config.access_token.clone())
    }

    /// Build an authenticated GET request.
    fn get_request(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
    }

    /// Execute a request and expect a JSON response, keeping the echoed rate budget.
    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiResponse<T>, StravaError> {
        let resp = request.send().await?;
        let rate_limit = RateLimitUsage::from_headers(resp.headers());
        if !resp.status().is_success() {
            return Err(self.error_from_response(resp, rate_limit).await);
        }
        // Read body as text first so decoding failures carry a useful snippet.
        let text = resp.text().await?;
        let data = serde_json::from_str::<T>(&text).map_err(|e| {
            let body_snippet: String = text.chars().take(256).collect();
            StravaError::Decode(format!("{} - body: {}", e, body_snippet))
        })?;
        Ok(ApiResponse::new(data, rate_limit))
    }

    /// Extract error information from a failed response.
    async fn error_from_response(
        &self,
        resp: reqwest::Response,
        rate_limit: Option<RateLimitUsage>,
    ) -> StravaError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let body_snippet: String = body.chars().take(256).collect();

        match status {
            404 => StravaError::NotFound(body_snippet),
            401 | 403 => StravaError::Auth(body_snippet),
            429 => StravaError::RateLimited { usage: rate_limit },
            _ => StravaError::Status {
                status,
                body: body_snippet,
            },
        }
    }
}

#[async_trait]
impl StravaClient for ReqwestStravaClient {
    async fn list_activities(
        &self,
        query: &ListActivitiesQuery,
    ) -> Result<ApiResponse<Vec<serde_json::Value>>, StravaError> {
        let url = format!("{}/athlete/activities", self.base_url);
        let pairs = query.to_pairs();
        let qp: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        tracing::debug!(page = query.page, "listing activities");
        self.execute_json(self.get_request(&url).query(&qp)).await
    }

    async fn get_activity_details(
        &self,
        activity_id: ActivityId,
    ) -> Result<ApiResponse<serde_json::Value>, StravaError> {
        let url = format!("{}/activities/{}", self.base_url, activity_id);
        tracing::debug!(activity_id, "getting activity details");
        self.execute_json(self.get_request(&url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_new_trims_trailing_slash() {
        let client = ReqwestStravaClient::new("http://localhost/api/v3/", SecretString::new("tok".into()))
            .expect("client");
        assert_eq!(client.base_url, "http://localhost/api/v3");
    }
}
