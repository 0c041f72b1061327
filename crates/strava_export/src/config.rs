use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{SyncError, SyncResult};
use crate::rate_governor::DEFAULT_CALLS_PER_WINDOW;

pub const DEFAULT_DB_PATH: &str = "db.sqlite3";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// Largest `per_page` the activities endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportConfig {
    pub db_path: PathBuf,
    pub page_size: u32,
    pub calls_per_window: u32,
    pub max_retries: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            page_size: DEFAULT_PAGE_SIZE,
            calls_per_window: DEFAULT_CALLS_PER_WINDOW,
            max_retries: 3,
        }
    }
}

impl ExportConfig {
    pub fn from_env() -> SyncResult<Self> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function instead of the process environment.
    pub fn from_env_with<F>(mut get: F) -> SyncResult<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            db_path: get("STRAVA_EXPORT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            page_size: parse_or(&mut get, "STRAVA_EXPORT_PAGE_SIZE", defaults.page_size)?,
            calls_per_window: parse_or(
                &mut get,
                "STRAVA_EXPORT_CALLS_PER_WINDOW",
                defaults.calls_per_window,
            )?,
            max_retries: parse_or(&mut get, "STRAVA_EXPORT_MAX_RETRIES", defaults.max_retries)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(SyncError::Configuration(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.calls_per_window == 0 {
            return Err(SyncError::Configuration(
                "calls per window must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_or<F, T>(get: &mut F, key: &str, default: T) -> SyncResult<T>
where
    F: FnMut(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SyncError::Configuration(format!("{key} has an invalid value {raw:?}"))),
    }
}
