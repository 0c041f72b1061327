//! Rate-governed access to the remote activity endpoints.
//!
//! Every remote call goes through [`Fetcher::call`], which asks the
//! [`RateGovernor`] first, feeds the echoed budget back afterwards and retries
//! transient failures with backoff. Summaries are walked page by page with
//! [`SummaryPages`]; details are fetched one activity at a time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use strava_client::rate_limit::next_quarter_hour;
use strava_client::retry::RetryPolicy;
use strava_client::{ActivityId, ApiResponse, ListActivitiesQuery, StravaClient, StravaError};

use crate::error::{SyncError, SyncResult};
use crate::model::SyncCursor;
use crate::rate_governor::{Admission, Clock, RateGovernor};

/// Longest single sleep while waiting for a budget reset, so progress gets logged.
const WAIT_CHUNK: Duration = Duration::from_secs(30);

/// What to do when the call budget is exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitMode {
    /// Sleep until the budget resets, then carry on.
    Wait,
    /// Give up with [`SyncError::RateLimitExceeded`] so the pass can suspend.
    Stop,
}

pub struct Fetcher {
    client: Arc<dyn StravaClient>,
    clock: Arc<dyn Clock>,
    governor: RateGovernor,
    retry: RetryPolicy,
    mode: RateLimitMode,
}

impl Fetcher {
    pub fn new(
        client: Arc<dyn StravaClient>,
        clock: Arc<dyn Clock>,
        governor: RateGovernor,
        retry: RetryPolicy,
        mode: RateLimitMode,
    ) -> Self {
        Self {
            client,
            clock,
            governor,
            retry,
            mode,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Lazily walk the summaries in `window`, one remote call per page.
    /// Calling this again with the same window starts over from page 1.
    pub fn summary_pages(&mut self, window: &SyncCursor, page_size: u32) -> SummaryPages<'_> {
        let query = ListActivitiesQuery {
            // An explicit lower bound makes the API return oldest first. The
            // API's `after` is exclusive; one second earlier keeps activities
            // starting exactly at the bound.
            after: Some(window.after().map(|t| t.timestamp() - 1).unwrap_or(0)),
            before: window.before().map(|t| t.timestamp()),
            per_page: Some(page_size),
            page: 1,
        };
        SummaryPages {
            fetcher: self,
            query,
            page_size,
            done: false,
        }
    }

    pub async fn fetch_detail(&mut self, id: ActivityId) -> SyncResult<Value> {
        let client = Arc::clone(&self.client);
        self.call(
            move || {
                let client = Arc::clone(&client);
                async move { client.get_activity_details(id).await }
            },
            move |err| match err {
                StravaError::NotFound(_) => SyncError::RecordNotFound(id),
                other => other.into(),
            },
        )
        .await
    }

    /// Block (or bail out, per mode) until the governor admits a call.
    async fn wait_for_admission(&mut self) -> SyncResult<()> {
        loop {
            let now = self.clock.now();
            let wait = match self.governor.admit(now) {
                Admission::Proceed => return Ok(()),
                Admission::MustWait(wait) => wait,
            };
            let retry_at = self.governor.budget().window_reset_at;
            match self.mode {
                RateLimitMode::Stop => return Err(SyncError::RateLimitExceeded { retry_at }),
                RateLimitMode::Wait => {
                    let minutes_left = wait.as_secs() / 60 + 1;
                    tracing::warn!(%retry_at, minutes_left, "rate limit reached, sleeping until reset");
                    self.clock.sleep(wait.min(WAIT_CHUNK)).await;
                }
            }
        }
    }

    async fn call<T, F, Fut>(
        &mut self,
        mut request: F,
        map_err: impl Fn(StravaError) -> SyncError,
    ) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ApiResponse<T>, StravaError>>,
    {
        let mut attempt = 0u32;
        loop {
            self.wait_for_admission().await?;
            let result = request().await;
            let now = self.clock.now();
            match result {
                Ok(resp) => {
                    self.governor.observe(resp.rate_limit.as_ref(), now);
                    return Ok(resp.data);
                }
                Err(StravaError::RateLimited { usage }) => {
                    // Same request again once the budget resets; not a new attempt.
                    let reset_at = usage
                        .map(|u| u.reset_at(now))
                        .unwrap_or_else(|| next_quarter_hour(now));
                    tracing::warn!(%reset_at, "API refused the call with 429");
                    self.governor.exhaust(reset_at);
                }
                Err(err) if err.is_transient() => {
                    self.governor.record_call();
                    attempt += 1;
                    if !self.retry.should_retry(attempt) {
                        return Err(map_err(err));
                    }
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(attempt, ?delay, error = %err, "transient API failure, retrying");
                    self.clock.sleep(delay).await;
                }
                Err(err) => {
                    self.governor.record_call();
                    return Err(map_err(err));
                }
            }
        }
    }
}

/// Lazy, finite sequence of summary pages. Ends on an empty page or on a
/// page shorter than the requested size.
pub struct SummaryPages<'a> {
    fetcher: &'a mut Fetcher,
    query: ListActivitiesQuery,
    page_size: u32,
    done: bool,
}

impl SummaryPages<'_> {
    /// Number of the page the next call will request.
    pub fn page_number(&self) -> u32 {
        self.query.page
    }

    pub async fn next_page(&mut self) -> SyncResult<Option<Vec<Value>>> {
        if self.done {
            return Ok(None);
        }
        let client = Arc::clone(&self.fetcher.client);
        let query = self.query.clone();
        let page = self
            .fetcher
            .call(
                move || {
                    let client = Arc::clone(&client);
                    let query = query.clone();
                    async move { client.list_activities(&query).await }
                },
                SyncError::from,
            )
            .await?;
        tracing::debug!(page = self.query.page, records = page.len(), "fetched summary page");
        if page.len() < self.page_size as usize {
            self.done = true;
        }
        if page.is_empty() {
            return Ok(None);
        }
        self.query.page += 1;
        Ok(Some(page))
    }
}
