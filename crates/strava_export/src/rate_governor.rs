//! Call budget tracking for the remote API.
//!
//! The governor is plain in-memory state owned by one fetcher; it never
//! sleeps itself. Callers ask [`RateGovernor::admit`] before each request
//! and feed the server's echoed budget back with [`RateGovernor::observe`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strava_client::RateLimitUsage;
use strava_client::rate_limit::next_quarter_hour;

/// Strava's read budget for one 15 minute window.
pub const DEFAULT_CALLS_PER_WINDOW: u32 = 100;

/// Source of time for rate-limit waits, injectable for tests.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by chrono and tokio timers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateBudget {
    pub remaining_calls: u32,
    pub window_reset_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    MustWait(Duration),
}

#[derive(Clone, Debug)]
pub struct RateGovernor {
    budget: RateBudget,
    calls_per_window: u32,
}

impl RateGovernor {
    /// Start with a conservative local budget until the API reports its own.
    pub fn new(calls_per_window: u32, now: DateTime<Utc>) -> Self {
        Self {
            budget: RateBudget {
                remaining_calls: calls_per_window,
                window_reset_at: next_quarter_hour(now),
            },
            calls_per_window,
        }
    }

    pub fn budget(&self) -> RateBudget {
        self.budget
    }

    /// Whether a request may be issued at `now`.
    pub fn admit(&mut self, now: DateTime<Utc>) -> Admission {
        if now >= self.budget.window_reset_at {
            self.budget = RateBudget {
                remaining_calls: self.calls_per_window,
                window_reset_at: next_quarter_hour(now),
            };
        }
        if self.budget.remaining_calls <= 1 && self.budget.window_reset_at > now {
            let wait = (self.budget.window_reset_at - now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            return Admission::MustWait(wait);
        }
        Admission::Proceed
    }

    /// Replace the tracked budget with fresh numbers from the server.
    pub fn update(&mut self, remaining: u32, reset_at: DateTime<Utc>) {
        self.budget = RateBudget {
            remaining_calls: remaining,
            window_reset_at: reset_at,
        };
    }

    /// Account for a completed call, with or without echoed budget headers.
    pub fn observe(&mut self, usage: Option<&RateLimitUsage>, now: DateTime<Utc>) {
        match usage {
            Some(usage) => self.update(usage.remaining(), usage.reset_at(now)),
            None => self.record_call(),
        }
    }

    /// Local counting for responses that carry no budget information.
    pub fn record_call(&mut self) {
        self.budget.remaining_calls = self.budget.remaining_calls.saturating_sub(1);
    }

    /// The server refused a call: nothing more until `reset_at`.
    pub fn exhaust(&mut self, reset_at: DateTime<Utc>) {
        self.update(0, reset_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn fresh_governor_proceeds() {
        let now = at("2025-01-18T14:07:00Z");
        let mut gov = RateGovernor::new(DEFAULT_CALLS_PER_WINDOW, now);
        assert_eq!(gov.admit(now), Admission::Proceed);
        assert_eq!(gov.budget().window_reset_at, at("2025-01-18T14:15:00Z"));
    }

    #[test]
    fn last_call_is_kept_in_reserve() {
        let now = at("2025-01-18T14:07:00Z");
        let mut gov = RateGovernor::new(2, now);
        assert_eq!(gov.admit(now), Admission::Proceed);
        gov.record_call();
        assert_eq!(
            gov.admit(now),
            Admission::MustWait(Duration::from_secs(8 * 60))
        );
    }

    #[test]
    fn must_wait_reports_exact_time_to_reset() {
        let now = at("2025-01-18T14:07:30Z");
        let mut gov = RateGovernor::new(100, now);
        gov.update(1, at("2025-01-18T14:15:00Z"));
        assert_eq!(
            gov.admit(now),
            Admission::MustWait(Duration::from_secs(7 * 60 + 30))
        );
    }

    #[test]
    fn budget_refills_after_reset() {
        let now = at("2025-01-18T14:07:30Z");
        let mut gov = RateGovernor::new(100, now);
        gov.exhaust(at("2025-01-18T14:15:00Z"));
        let later = at("2025-01-18T14:15:00Z");
        assert_eq!(gov.admit(later), Admission::Proceed);
        assert_eq!(gov.budget().remaining_calls, 100);
        assert_eq!(gov.budget().window_reset_at, at("2025-01-18T14:30:00Z"));
    }

    #[test]
    fn observe_prefers_echoed_budget() {
        let now = at("2025-01-18T14:07:30Z");
        let mut gov = RateGovernor::new(100, now);
        let usage = RateLimitUsage {
            short_limit: 100,
            short_usage: 40,
            daily_limit: 1000,
            daily_usage: 500,
        };
        gov.observe(Some(&usage), now);
        assert_eq!(gov.budget().remaining_calls, 60);
        gov.observe(None, now);
        assert_eq!(gov.budget().remaining_calls, 59);
    }

    #[test]
    fn exhausted_daily_budget_waits_until_midnight() {
        let now = at("2025-01-18T22:00:00Z");
        let mut gov = RateGovernor::new(100, now);
        let usage = RateLimitUsage {
            short_limit: 100,
            short_usage: 2,
            daily_limit: 1000,
            daily_usage: 1000,
        };
        gov.observe(Some(&usage), now);
        assert_eq!(
            gov.admit(now),
            Admission::MustWait(Duration::from_secs(2 * 60 * 60))
        );
    }
}
