//! Per-record write decisions.

use serde::Serialize;

use crate::checksum::Checksum;
use crate::error::{SyncError, SyncResult};
use crate::model::{Granularity, SyncOutcome};

/// How a pass treats records that already exist locally. Selected once per pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStrategy {
    /// Insert missing records, overwrite existing ones whose checksum changed.
    OverwriteIfChanged,
    /// Insert missing records, never touch existing ones.
    OnlyMissing,
}

/// What to do with one candidate record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Insert,
    Update,
    SkipUnchanged,
    SkipExisting,
}

impl Decision {
    pub fn writes(&self) -> bool {
        matches!(self, Decision::Insert | Decision::Update)
    }

    pub fn outcome(&self) -> SyncOutcome {
        match self {
            Decision::Insert => SyncOutcome::Inserted,
            Decision::Update => SyncOutcome::Updated,
            Decision::SkipUnchanged => SyncOutcome::SkippedUnchanged,
            Decision::SkipExisting => SyncOutcome::SkippedExisting,
        }
    }
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::OverwriteIfChanged => "OVERWRITE_IF_CHANGED",
            SyncStrategy::OnlyMissing => "ONLY_MISSING",
        }
    }

    /// Summaries are cheap to re-list and always go through change detection.
    pub fn validate_for(&self, granularity: Granularity) -> SyncResult<()> {
        match (self, granularity) {
            (SyncStrategy::OnlyMissing, Granularity::Summary) => Err(SyncError::Configuration(
                "ONLY_MISSING is not supported for summaries, use OVERWRITE_IF_CHANGED".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Decide given the locally stored checksum (if any) and the incoming one.
    ///
    /// The checksum is the only input: an edit that leaves the normalized
    /// payload identical is treated as unchanged.
    pub fn decide(&self, stored: Option<&str>, incoming: &Checksum) -> Decision {
        match (self, stored) {
            (_, None) => Decision::Insert,
            (SyncStrategy::OnlyMissing, Some(_)) => Decision::SkipExisting,
            (SyncStrategy::OverwriteIfChanged, Some(stored)) if incoming == stored => {
                Decision::SkipUnchanged
            }
            (SyncStrategy::OverwriteIfChanged, Some(_)) => Decision::Update,
        }
    }
}

impl std::fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStrategy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OVERWRITE_IF_CHANGED" => Ok(SyncStrategy::OverwriteIfChanged),
            "ONLY_MISSING" => Ok(SyncStrategy::OnlyMissing),
            other => Err(SyncError::Configuration(format!(
                "unknown strategy {other:?}, expected OVERWRITE_IF_CHANGED or ONLY_MISSING"
            ))),
        }
    }
}
