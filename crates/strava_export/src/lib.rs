//! Export engine that mirrors Strava activities into a local SQLite store.
//!
//! A pass lists summaries (or fetches details) inside a time window, computes
//! a content checksum per record and lets a [`SyncStrategy`] decide whether
//! the local copy is inserted, overwritten or left alone.

pub mod checksum;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod orchestrator;
pub mod persist;
pub mod rate_governor;
pub mod report;
pub mod store;
pub mod strategy;

#[cfg(test)]
mod test_utils;

pub use config::ExportConfig;
pub use error::{SyncError, SyncResult};
pub use fetcher::{Fetcher, RateLimitMode};
pub use model::{Granularity, SyncCursor, SyncOutcome};
pub use orchestrator::{PassRequest, SyncOrchestrator};
pub use rate_governor::{Clock, RateGovernor, SystemClock};
pub use report::{OutcomeCounts, PassReport, PassStatus, RecordFailure, SuspendReason};
pub use store::ActivityStore;
pub use strategy::SyncStrategy;
