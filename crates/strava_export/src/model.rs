//! Records flowing through an export pass.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;
use strava_client::ActivityId;

use crate::checksum::{self, Checksum};
use crate::error::{SyncError, SyncResult};

/// Which representation of an activity a pass exports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Summary,
    Detail,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Summary => "summary",
            Granularity::Detail => "detail",
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activity summary as listed by `GET /athlete/activities`.
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryRecord {
    pub id: ActivityId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub name: Option<String>,
    pub sport_type: Option<String>,
    pub payload: String,
    pub checksum: Checksum,
}

/// Detailed activity as returned by `GET /activities/{id}`.
#[derive(Clone, Debug, PartialEq)]
pub struct DetailRecord {
    pub id: ActivityId,
    pub description: Option<String>,
    pub payload: String,
    pub checksum: Checksum,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActivityRecord {
    Summary(SummaryRecord),
    Detail(DetailRecord),
}

impl ActivityRecord {
    pub fn id(&self) -> ActivityId {
        match self {
            ActivityRecord::Summary(s) => s.id,
            ActivityRecord::Detail(d) => d.id,
        }
    }

    pub fn checksum(&self) -> &Checksum {
        match self {
            ActivityRecord::Summary(s) => &s.checksum,
            ActivityRecord::Detail(d) => &d.checksum,
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            ActivityRecord::Summary(_) => Granularity::Summary,
            ActivityRecord::Detail(_) => Granularity::Detail,
        }
    }
}

/// Identifier of a raw payload, when it has a usable one.
pub fn raw_id(raw: &Value) -> Option<ActivityId> {
    raw.get("id").and_then(Value::as_i64)
}

impl SummaryRecord {
    pub fn from_raw(raw: &Value) -> SyncResult<Self> {
        let id = raw_id(raw)
            .ok_or_else(|| SyncError::InvalidRecord("summary without an integer id".into()))?;
        let start_raw = raw.get("start_date").and_then(Value::as_str).ok_or_else(|| {
            SyncError::InvalidRecord(format!("summary {id} has no start_date"))
        })?;
        let start = DateTime::parse_from_rfc3339(start_raw)
            .map_err(|e| {
                SyncError::InvalidRecord(format!(
                    "summary {id} has an invalid start_date {start_raw:?}: {e}"
                ))
            })?
            .with_timezone(&Utc);
        let elapsed = raw.get("elapsed_time").and_then(Value::as_i64).unwrap_or(0);
        let end = TimeDelta::try_seconds(elapsed.max(0))
            .and_then(|d| start.checked_add_signed(d))
            .ok_or_else(|| {
                SyncError::InvalidRecord(format!(
                    "summary {id} has an out of range elapsed_time {elapsed}"
                ))
            })?;
        check_heart_rate(id, raw)?;

        let payload = checksum::canonical_json(raw);
        let checksum = checksum::fingerprint_canonical(&payload);
        Ok(Self {
            id,
            start,
            end,
            name: string_field(raw, "name"),
            sport_type: string_field(raw, "sport_type").or_else(|| string_field(raw, "type")),
            payload,
            checksum,
        })
    }
}

impl DetailRecord {
    pub fn from_raw(raw: &Value) -> SyncResult<Self> {
        let id = raw_id(raw)
            .ok_or_else(|| SyncError::InvalidRecord("detail without an integer id".into()))?;
        check_heart_rate(id, raw)?;
        check_gear(id, raw)?;

        let payload = checksum::canonical_json(raw);
        let checksum = checksum::fingerprint_canonical(&payload);
        Ok(Self {
            id,
            description: string_field(raw, "description"),
            payload,
            checksum,
        })
    }
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Heart-rate attributes come as a set: all present or all absent.
fn check_heart_rate(id: ActivityId, raw: &Value) -> SyncResult<()> {
    let flags = [
        truthy(raw.get("has_heartrate")),
        truthy(raw.get("average_heartrate")),
        truthy(raw.get("max_heartrate")),
    ];
    if flags.iter().all(|f| *f) || flags.iter().all(|f| !*f) {
        return Ok(());
    }
    Err(SyncError::InvalidRecord(format!(
        "heart rate attributes inconsistent for activity {id}: has_heartrate={}, average_heartrate={}, max_heartrate={}",
        raw.get("has_heartrate").unwrap_or(&Value::Null),
        raw.get("average_heartrate").unwrap_or(&Value::Null),
        raw.get("max_heartrate").unwrap_or(&Value::Null),
    )))
}

fn check_gear(id: ActivityId, raw: &Value) -> SyncResult<()> {
    let Some(gear) = raw.get("gear").filter(|g| g.is_object()) else {
        return Ok(());
    };
    let gear_id = raw.get("gear_id").unwrap_or(&Value::Null);
    let nested = gear.get("id").unwrap_or(&Value::Null);
    if gear_id != nested {
        return Err(SyncError::InvalidRecord(format!(
            "gear id mismatch for activity {id}: gear_id={gear_id} but gear.id={nested}"
        )));
    }
    Ok(())
}

/// Remote time window `[after, before)` scanned by a pass.
///
/// The bounds never change once a pass starts; `last_processed` only moves
/// forward as records complete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncCursor {
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
    last_processed: Option<DateTime<Utc>>,
}

impl SyncCursor {
    pub fn new(after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Self {
        Self {
            after,
            before,
            last_processed: None,
        }
    }

    pub fn after(&self) -> Option<DateTime<Utc>> {
        self.after
    }

    pub fn before(&self) -> Option<DateTime<Utc>> {
        self.before
    }

    /// Record that everything up to `ts` has been handled.
    pub fn advance(&mut self, ts: DateTime<Utc>) {
        if self.last_processed.is_none_or(|prev| ts > prev) {
            self.last_processed = Some(ts);
        }
    }

    /// The `after` bound a follow-up invocation should use to pick up
    /// where this one stopped. Bounds are inclusive, so the last processed
    /// record is seen again and skipped as unchanged.
    pub fn resume_after(&self) -> Option<DateTime<Utc>> {
        self.last_processed.or(self.after)
    }
}

/// Result of handling one candidate record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Inserted,
    Updated,
    SkippedUnchanged,
    SkippedExisting,
    Failed,
}

impl SyncOutcome {
    pub const ALL: [SyncOutcome; 5] = [
        SyncOutcome::Inserted,
        SyncOutcome::Updated,
        SyncOutcome::SkippedUnchanged,
        SyncOutcome::SkippedExisting,
        SyncOutcome::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Inserted => "inserted",
            SyncOutcome::Updated => "updated",
            SyncOutcome::SkippedUnchanged => "skipped_unchanged",
            SyncOutcome::SkippedExisting => "skipped_existing",
            SyncOutcome::Failed => "failed",
        }
    }
}
