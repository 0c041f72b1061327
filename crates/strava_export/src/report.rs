//! Pass results as handed back to the caller and printed for the operator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strava_client::ActivityId;

use crate::model::{Granularity, SyncOutcome};
use crate::strategy::SyncStrategy;

/// Number of records per [`SyncOutcome`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub inserted: u64,
    pub updated: u64,
    pub skipped_unchanged: u64,
    pub skipped_existing: u64,
    pub failed: u64,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: SyncOutcome) {
        *self.slot(outcome) += 1;
    }

    pub fn get(&self, outcome: SyncOutcome) -> u64 {
        match outcome {
            SyncOutcome::Inserted => self.inserted,
            SyncOutcome::Updated => self.updated,
            SyncOutcome::SkippedUnchanged => self.skipped_unchanged,
            SyncOutcome::SkippedExisting => self.skipped_existing,
            SyncOutcome::Failed => self.failed,
        }
    }

    pub fn total(&self) -> u64 {
        SyncOutcome::ALL.iter().map(|o| self.get(*o)).sum()
    }

    fn slot(&mut self, outcome: SyncOutcome) -> &mut u64 {
        match outcome {
            SyncOutcome::Inserted => &mut self.inserted,
            SyncOutcome::Updated => &mut self.updated,
            SyncOutcome::SkippedUnchanged => &mut self.skipped_unchanged,
            SyncOutcome::SkippedExisting => &mut self.skipped_existing,
            SyncOutcome::Failed => &mut self.failed,
        }
    }
}

impl std::ops::Add for OutcomeCounts {
    type Output = OutcomeCounts;

    fn add(self, rhs: OutcomeCounts) -> OutcomeCounts {
        OutcomeCounts {
            inserted: self.inserted + rhs.inserted,
            updated: self.updated + rhs.updated,
            skipped_unchanged: self.skipped_unchanged + rhs.skipped_unchanged,
            skipped_existing: self.skipped_existing + rhs.skipped_existing,
            failed: self.failed + rhs.failed,
        }
    }
}

/// A record the pass could not handle. `id` is `None` when the payload
/// carried no usable identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub id: Option<ActivityId>,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuspendReason {
    RateLimited { retry_at: DateTime<Utc> },
    Cancelled,
    PageFetchFailed { error: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassStatus {
    Completed,
    /// Stopped early. Re-running with `after_ts = resume_after` picks up
    /// where this pass left off.
    Suspended {
        reason: SuspendReason,
        resume_after: Option<DateTime<Utc>>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub granularity: Granularity,
    pub strategy: SyncStrategy,
    pub counts: OutcomeCounts,
    pub failures: Vec<RecordFailure>,
    pub status: PassStatus,
    /// Clock reading when the pass stopped; wait hints are relative to it.
    pub finished_at: DateTime<Utc>,
}

impl PassReport {
    pub fn new(granularity: Granularity, strategy: SyncStrategy, now: DateTime<Utc>) -> Self {
        Self {
            granularity,
            strategy,
            counts: OutcomeCounts::default(),
            failures: Vec::new(),
            status: PassStatus::Completed,
            finished_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, PassStatus::Completed)
    }

    pub fn resume_after(&self) -> Option<DateTime<Utc>> {
        match &self.status {
            PassStatus::Completed => None,
            PassStatus::Suspended { resume_after, .. } => *resume_after,
        }
    }
}

impl fmt::Display for SuspendReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspendReason::RateLimited { retry_at } => {
                write!(f, "rate limit exceeded, budget resets at {retry_at}")
            }
            SuspendReason::Cancelled => f.write_str("cancelled"),
            SuspendReason::PageFetchFailed { error } => {
                write!(f, "could not fetch the next page: {error}")
            }
        }
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_completed() { "completed" } else { "suspended" };
        writeln!(f, "{} pass ({}) {state}", self.granularity, self.strategy)?;
        for outcome in SyncOutcome::ALL {
            writeln!(f, "  {:<18} {}", outcome.as_str(), self.counts.get(outcome))?;
        }
        if !self.failures.is_empty() {
            writeln!(f, "failed records:")?;
            for failure in &self.failures {
                match failure.id {
                    Some(id) => writeln!(f, "  {id}: {}", failure.reason)?,
                    None => writeln!(f, "  <no id>: {}", failure.reason)?,
                }
            }
        }
        if let PassStatus::Suspended {
            reason,
            resume_after,
        } = &self.status
        {
            writeln!(f, "stopped: {reason}")?;
            if let SuspendReason::RateLimited { retry_at } = reason {
                let secs = (*retry_at - self.finished_at).num_seconds().max(0);
                let minutes = (secs + 59) / 60;
                writeln!(f, "wait about {minutes} minute(s) before re-running")?;
            }
            match resume_after {
                Some(ts) => writeln!(
                    f,
                    "resume with --after-ts {} ({})",
                    ts.timestamp(),
                    ts.to_rfc3339()
                )?,
                None => writeln!(f, "resume with the same arguments")?,
            }
        }
        Ok(())
    }
}
