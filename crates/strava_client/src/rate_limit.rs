//! Parsing of the rate-limit headers Strava echoes on every response.
//!
//! Strava enforces two budgets at once: a short one that resets at the
//! natural quarter hours (minutes 0, 15, 30 and 45) and a daily one that
//! resets at midnight UTC. Both are reported as `"short,daily"` pairs in
//! the `*-Limit` and `*-Usage` headers; read endpoints additionally carry
//! the stricter `X-ReadRateLimit-*` variants.

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::HeaderMap;

const SHORT_WINDOW_SECS: i64 = 15 * 60;
const DAY_SECS: i64 = 24 * 60 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitUsage {
    pub short_limit: u32,
    pub short_usage: u32,
    pub daily_limit: u32,
    pub daily_usage: u32,
}

impl RateLimitUsage {
    /// Read the budget from response headers, preferring the read-specific pair.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        Self::from_header_pair(headers, "x-readratelimit-limit", "x-readratelimit-usage")
            .or_else(|| Self::from_header_pair(headers, "x-ratelimit-limit", "x-ratelimit-usage"))
    }

    fn from_header_pair(headers: &HeaderMap, limit: &str, usage: &str) -> Option<Self> {
        let (short_limit, daily_limit) = parse_pair(headers.get(limit)?.to_str().ok()?)?;
        let (short_usage, daily_usage) = parse_pair(headers.get(usage)?.to_str().ok()?)?;
        Some(Self {
            short_limit,
            short_usage,
            daily_limit,
            daily_usage,
        })
    }

    pub fn short_remaining(&self) -> u32 {
        self.short_limit.saturating_sub(self.short_usage)
    }

    pub fn daily_remaining(&self) -> u32 {
        self.daily_limit.saturating_sub(self.daily_usage)
    }

    /// Calls left before either budget is exhausted.
    pub fn remaining(&self) -> u32 {
        self.short_remaining().min(self.daily_remaining())
    }

    /// When the binding budget refills: midnight UTC if the daily budget is
    /// the one running out, otherwise the next quarter hour.
    pub fn reset_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if self.daily_remaining() <= 1 {
            next_midnight(now)
        } else {
            next_quarter_hour(now)
        }
    }
}

fn parse_pair(raw: &str) -> Option<(u32, u32)> {
    let mut parts = raw.split(',').map(|p| p.trim().parse::<u32>());
    let first = parts.next()?.ok()?;
    let second = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((first, second))
}

/// Next boundary at minute 0, 15, 30 or 45 strictly after `now`.
pub fn next_quarter_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    next_boundary(now, SHORT_WINDOW_SECS)
}

/// Next midnight UTC strictly after `now`.
pub fn next_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    next_boundary(now, DAY_SECS)
}

fn next_boundary(now: DateTime<Utc>, period: i64) -> DateTime<Utc> {
    let next = (now.timestamp().div_euclid(period) + 1) * period;
    DateTime::from_timestamp(next, 0).unwrap_or(now + TimeDelta::seconds(period))
}
