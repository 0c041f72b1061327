//! Drives one export pass: validates the request, walks the remote window,
//! decides per record and writes through the store.
//!
//! A pass never aborts because of one bad record. Configuration and
//! authentication problems come back as `Err`; a rate limit, a cancellation
//! or a page that cannot be fetched suspends the pass and the report
//! carries the cursor to resume from.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;

use crate::config::MAX_PAGE_SIZE;
use crate::error::{SyncError, SyncResult};
use crate::fetcher::Fetcher;
use crate::model::{
    ActivityRecord, DetailRecord, Granularity, SummaryRecord, SyncCursor, SyncOutcome, raw_id,
};
use crate::persist::PersistedOutcome;
use crate::report::{PassReport, PassStatus, RecordFailure, SuspendReason};
use crate::store::ActivityStore;
use crate::strategy::{Decision, SyncStrategy};

/// What the caller asks a pass to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassRequest {
    pub granularity: Granularity,
    pub strategy: SyncStrategy,
    pub after: Option<DateTime<Utc>>,
    /// Defaults to the moment the pass starts.
    pub before: Option<DateTime<Utc>>,
}

pub struct SyncOrchestrator {
    fetcher: Fetcher,
    store: ActivityStore,
    page_size: u32,
    cancel: Option<watch::Receiver<bool>>,
}

impl SyncOrchestrator {
    pub fn new(fetcher: Fetcher, store: ActivityStore, page_size: u32) -> Self {
        Self {
            fetcher,
            store,
            page_size,
            cancel: None,
        }
    }

    /// Stop after the record in flight once `true` is sent on the channel.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn store(&self) -> &ActivityStore {
        &self.store
    }

    pub async fn run(&mut self, request: &PassRequest) -> SyncResult<PassReport> {
        let mut cursor = self.validate(request)?;
        let mut report =
            PassReport::new(request.granularity, request.strategy, self.fetcher.clock().now());
        tracing::info!(
            granularity = %request.granularity,
            strategy = %request.strategy,
            after = ?cursor.after(),
            before = ?cursor.before(),
            "starting pass"
        );

        let suspended = match request.granularity {
            Granularity::Summary => {
                self.summary_pass(request.strategy, &mut cursor, &mut report)
                    .await?
            }
            Granularity::Detail => {
                self.detail_pass(request.strategy, &mut cursor, &mut report)
                    .await?
            }
        };
        if let Some(reason) = suspended {
            tracing::warn!(%reason, resume_after = ?cursor.resume_after(), "pass suspended");
            report.status = PassStatus::Suspended {
                reason,
                resume_after: cursor.resume_after(),
            };
        }
        report.finished_at = self.fetcher.clock().now();

        tracing::info!(
            granularity = %request.granularity,
            inserted = report.counts.inserted,
            updated = report.counts.updated,
            skipped_unchanged = report.counts.skipped_unchanged,
            skipped_existing = report.counts.skipped_existing,
            failed = report.counts.failed,
            completed = report.is_completed(),
            "pass finished"
        );
        Ok(report)
    }

    /// Everything that can be checked before the first remote call.
    fn validate(&self, request: &PassRequest) -> SyncResult<SyncCursor> {
        request.strategy.validate_for(request.granularity)?;
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(SyncError::Configuration(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        let now = self.fetcher.clock().now();
        if let Some(after) = request.after
            && after > now
        {
            return Err(SyncError::Configuration(format!(
                "after_ts {after} is in the future"
            )));
        }
        let before = request.before.unwrap_or(now);
        if let Some(after) = request.after
            && after >= before
        {
            return Err(SyncError::Configuration(format!(
                "after_ts {after} must be earlier than before_ts {before}"
            )));
        }
        Ok(SyncCursor::new(request.after, Some(before)))
    }

    async fn summary_pass(
        &mut self,
        strategy: SyncStrategy,
        cursor: &mut SyncCursor,
        report: &mut PassReport,
    ) -> SyncResult<Option<SuspendReason>> {
        let mut pages = self.fetcher.summary_pages(cursor, self.page_size);
        loop {
            let page_number = pages.page_number();
            let page = match pages.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => return Ok(None),
                Err(SyncError::RateLimitExceeded { retry_at }) => {
                    return Ok(Some(SuspendReason::RateLimited { retry_at }));
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(page = page_number, error = %err, "giving up on summary page");
                    return Ok(Some(SuspendReason::PageFetchFailed {
                        error: err.to_string(),
                    }));
                }
            };
            for raw in &page {
                match sync_summary(&mut self.store, strategy, raw) {
                    Ok((start, outcome)) => {
                        tally(report, Granularity::Summary, outcome);
                        cursor.advance(start);
                    }
                    Err(err) => fail(report, Granularity::Summary, raw_id(raw), &err),
                }
                if is_cancelled(self.cancel.as_ref()) {
                    return Ok(Some(SuspendReason::Cancelled));
                }
            }
        }
    }

    async fn detail_pass(
        &mut self,
        strategy: SyncStrategy,
        cursor: &mut SyncCursor,
        report: &mut PassReport,
    ) -> SyncResult<Option<SuspendReason>> {
        let only_missing = strategy == SyncStrategy::OnlyMissing;
        let candidates = self.store.detail_candidates(cursor, only_missing)?;
        tracing::info!(candidates = candidates.len(), "selected activities for details");

        for candidate in candidates {
            let raw = match self.fetcher.fetch_detail(candidate.id).await {
                Ok(raw) => raw,
                Err(SyncError::RateLimitExceeded { retry_at }) => {
                    return Ok(Some(SuspendReason::RateLimited { retry_at }));
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    fail(report, Granularity::Detail, Some(candidate.id), &err);
                    if is_cancelled(self.cancel.as_ref()) {
                        return Ok(Some(SuspendReason::Cancelled));
                    }
                    continue;
                }
            };
            match sync_detail(&mut self.store, strategy, candidate.id, &raw) {
                Ok(outcome) => {
                    tally(report, Granularity::Detail, outcome);
                    cursor.advance(candidate.start);
                }
                Err(err) => fail(report, Granularity::Detail, Some(candidate.id), &err),
            }
            if is_cancelled(self.cancel.as_ref()) {
                return Ok(Some(SuspendReason::Cancelled));
            }
        }
        Ok(None)
    }
}

fn sync_summary(
    store: &mut ActivityStore,
    strategy: SyncStrategy,
    raw: &Value,
) -> SyncResult<(DateTime<Utc>, SyncOutcome)> {
    let summary = SummaryRecord::from_raw(raw)?;
    let start = summary.start;
    let stored = store.summary_checksum(summary.id)?;
    let decision = strategy.decide(stored.as_deref(), &summary.checksum);
    let record = ActivityRecord::Summary(summary);
    let outcome = outcome_of(store.upsert(&record, decision)?, decision);
    log_outcome(&record, outcome);
    Ok((start, outcome))
}

fn sync_detail(
    store: &mut ActivityStore,
    strategy: SyncStrategy,
    expected_id: i64,
    raw: &Value,
) -> SyncResult<SyncOutcome> {
    let detail = DetailRecord::from_raw(raw)?;
    if detail.id != expected_id {
        return Err(SyncError::InvalidRecord(format!(
            "asked for activity {expected_id} but received {}",
            detail.id
        )));
    }
    let stored = store.detail_checksum(detail.id)?;
    let decision = strategy.decide(stored.as_deref(), &detail.checksum);
    let record = ActivityRecord::Detail(detail);
    let outcome = outcome_of(store.upsert(&record, decision)?, decision);
    log_outcome(&record, outcome);
    Ok(outcome)
}

/// What actually happened in the store; a skip keeps the decision's reason.
fn outcome_of(persisted: PersistedOutcome, decision: Decision) -> SyncOutcome {
    match persisted {
        PersistedOutcome::Inserted => SyncOutcome::Inserted,
        PersistedOutcome::Updated => SyncOutcome::Updated,
        PersistedOutcome::Unchanged => decision.outcome(),
    }
}

fn log_outcome(record: &ActivityRecord, outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::Inserted | SyncOutcome::Updated => tracing::info!(
            id = record.id(),
            granularity = %record.granularity(),
            outcome = outcome.as_str(),
            "record written"
        ),
        _ => tracing::debug!(
            id = record.id(),
            granularity = %record.granularity(),
            outcome = outcome.as_str(),
            "record skipped"
        ),
    }
}

fn tally(report: &mut PassReport, granularity: Granularity, outcome: SyncOutcome) {
    report.counts.record(outcome);
    metrics::counter!(
        "strava_export_records_total",
        "granularity" => granularity.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

fn fail(report: &mut PassReport, granularity: Granularity, id: Option<i64>, err: &SyncError) {
    tracing::warn!(?id, %granularity, error = %err, "record failed");
    tally(report, granularity, SyncOutcome::Failed);
    report.failures.push(RecordFailure {
        id,
        reason: err.to_string(),
    });
}

fn is_cancelled(cancel: Option<&watch::Receiver<bool>>) -> bool {
    cancel.is_some_and(|rx| *rx.borrow())
}
