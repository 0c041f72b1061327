//! Shared test doubles: a scripted in-memory Strava API and a manual clock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Value, json};
use strava_client::{
    ActivityId, ApiResponse, ListActivitiesQuery, RateLimitUsage, StravaClient, StravaError,
};

use crate::rate_governor::Clock;

pub fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// Summary payload starting `offset_secs` after 2025-01-01T00:00:00Z.
pub fn summary_json(id: i64, offset_secs: i64) -> Value {
    let start = at("2025-01-01T00:00:00Z") + TimeDelta::seconds(offset_secs);
    json!({
        "id": id,
        "name": format!("Activity {id}"),
        "sport_type": "Run",
        "type": "Run",
        "start_date": start.to_rfc3339(),
        "elapsed_time": 1800,
        "distance": 5000.0
    })
}

pub fn detail_json(id: i64, description: &str) -> Value {
    json!({"id": id, "description": description, "calories": 320.0})
}

/// Clock whose time only moves when something sleeps on it.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            slept: Mutex::new(Vec::new()),
        }
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
        *self.now.lock().unwrap() += TimeDelta::from_std(duration).unwrap();
    }
}

/// In-memory Strava API. `after` is exclusive and `before` exclusive,
/// results come oldest first.
pub struct FakeStravaClient {
    clock: Arc<ManualClock>,
    summaries: Mutex<Vec<Value>>,
    details: Mutex<HashMap<ActivityId, Value>>,
    usage: Mutex<Option<RateLimitUsage>>,
    list_errors: Mutex<VecDeque<StravaError>>,
    detail_errors: Mutex<HashMap<ActivityId, VecDeque<StravaError>>>,
    list_calls: Mutex<Vec<(ListActivitiesQuery, DateTime<Utc>)>>,
    detail_calls: Mutex<Vec<(ActivityId, DateTime<Utc>)>>,
}

impl FakeStravaClient {
    pub fn with_summaries(clock: Arc<ManualClock>, summaries: Vec<Value>) -> Self {
        Self {
            clock,
            summaries: Mutex::new(summaries),
            details: Mutex::new(HashMap::new()),
            usage: Mutex::new(None),
            list_errors: Mutex::new(VecDeque::new()),
            detail_errors: Mutex::new(HashMap::new()),
            list_calls: Mutex::new(Vec::new()),
            detail_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_summaries(&self, summaries: Vec<Value>) {
        *self.summaries.lock().unwrap() = summaries;
    }

    pub fn set_detail(&self, id: ActivityId, detail: Value) {
        self.details.lock().unwrap().insert(id, detail);
    }

    /// Budget echoed with every successful response.
    pub fn set_usage(&self, usage: Option<RateLimitUsage>) {
        *self.usage.lock().unwrap() = usage;
    }

    pub fn push_list_error(&self, err: StravaError) {
        self.list_errors.lock().unwrap().push_back(err);
    }

    pub fn push_detail_error(&self, id: ActivityId, err: StravaError) {
        self.detail_errors
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push_back(err);
    }

    pub fn list_calls(&self) -> Vec<ListActivitiesQuery> {
        self.list_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(q, _)| q.clone())
            .collect()
    }

    pub fn list_call_times(&self) -> Vec<DateTime<Utc>> {
        self.list_calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn detail_calls(&self) -> Vec<ActivityId> {
        self.detail_calls.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }
}

fn start_ts(v: &Value) -> i64 {
    v["start_date"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.timestamp())
        .unwrap_or(0)
}

#[async_trait]
impl StravaClient for FakeStravaClient {
    async fn list_activities(
        &self,
        query: &ListActivitiesQuery,
    ) -> Result<ApiResponse<Vec<Value>>, StravaError> {
        self.list_calls
            .lock()
            .unwrap()
            .push((query.clone(), self.clock.now()));
        if let Some(err) = self.list_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut matching: Vec<Value> = self
            .summaries
            .lock()
            .unwrap()
            .iter()
            .filter(|s| query.after.is_none_or(|a| start_ts(s) > a))
            .filter(|s| query.before.is_none_or(|b| start_ts(s) < b))
            .cloned()
            .collect();
        matching.sort_by_key(start_ts);
        let per_page = query.per_page.unwrap_or(30) as usize;
        let page = query.page.max(1) as usize;
        let data = matching
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();
        Ok(ApiResponse::new(data, *self.usage.lock().unwrap()))
    }

    async fn get_activity_details(
        &self,
        activity_id: ActivityId,
    ) -> Result<ApiResponse<Value>, StravaError> {
        self.detail_calls
            .lock()
            .unwrap()
            .push((activity_id, self.clock.now()));
        if let Some(err) = self
            .detail_errors
            .lock()
            .unwrap()
            .get_mut(&activity_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        match self.details.lock().unwrap().get(&activity_id) {
            Some(detail) => Ok(ApiResponse::new(detail.clone(), *self.usage.lock().unwrap())),
            None => Err(StravaError::NotFound("Record Not Found".into())),
        }
    }
}
