//! SQLite store holding exported summaries and details.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};
use strava_client::ActivityId;

use crate::error::{SyncError, SyncResult};
use crate::model::SyncCursor;

/// Schema migrations, tracked through the `user_version` pragma.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        r#"
        CREATE TABLE activity_summary (
            strava_id INTEGER PRIMARY KEY,
            start_ts INTEGER NOT NULL,
            end_ts INTEGER NOT NULL,
            name TEXT,
            sport_type TEXT,
            payload TEXT NOT NULL,
            checksum TEXT NOT NULL,
            has_details INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE INDEX idx_activity_summary_start_ts ON activity_summary(start_ts);

        CREATE TABLE activity_detail (
            strava_id INTEGER PRIMARY KEY
                REFERENCES activity_summary(strava_id) ON DELETE CASCADE,
            description TEXT,
            payload TEXT NOT NULL,
            checksum TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );
        "#,
    )])
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredSummary {
    pub id: ActivityId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub name: Option<String>,
    pub sport_type: Option<String>,
    pub payload: String,
    pub checksum: String,
    pub has_details: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredDetail {
    pub id: ActivityId,
    pub description: Option<String>,
    pub payload: String,
    pub checksum: String,
}

/// A summary whose detail the detail pass should fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetailCandidate {
    pub id: ActivityId,
    pub start: DateTime<Utc>,
}

/// Single-writer SQLite store. One pass at a time owns it.
pub struct ActivityStore {
    pub(crate) conn: Connection,
}

impl ActivityStore {
    pub fn open(db_path: impl AsRef<Path>) -> SyncResult<Self> {
        let conn = Connection::open(db_path.as_ref()).map_err(|e| {
            SyncError::Persistence(format!(
                "failed to open database at {:?}: {e}",
                db_path.as_ref()
            ))
        })?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> SyncResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> SyncResult<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        migrations().to_latest(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn summary_checksum(&self, id: ActivityId) -> SyncResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT checksum FROM activity_summary WHERE strava_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn detail_checksum(&self, id: ActivityId) -> SyncResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT checksum FROM activity_detail WHERE strava_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn get_summary(&self, id: ActivityId) -> SyncResult<Option<StoredSummary>> {
        let row = self
            .conn
            .query_row(
                "SELECT strava_id, start_ts, end_ts, name, sport_type, payload, checksum, has_details
                 FROM activity_summary WHERE strava_id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, bool>(7)?,
                    ))
                },
            )
            .optional()?;
        row.map(
            |(id, start_ts, end_ts, name, sport_type, payload, checksum, has_details)| {
                Ok(StoredSummary {
                    id,
                    start: from_epoch(start_ts)?,
                    end: from_epoch(end_ts)?,
                    name,
                    sport_type,
                    payload,
                    checksum,
                    has_details,
                })
            },
        )
        .transpose()
    }

    pub fn get_detail(&self, id: ActivityId) -> SyncResult<Option<StoredDetail>> {
        Ok(self
            .conn
            .query_row(
                "SELECT strava_id, description, payload, checksum
                 FROM activity_detail WHERE strava_id = ?1",
                params![id],
                |row| {
                    Ok(StoredDetail {
                        id: row.get(0)?,
                        description: row.get(1)?,
                        payload: row.get(2)?,
                        checksum: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn count_summaries(&self) -> SyncResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM activity_summary", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Summaries inside the cursor window, oldest first. With `only_missing`
    /// the ones that already have details are left out.
    pub fn detail_candidates(
        &self,
        window: &SyncCursor,
        only_missing: bool,
    ) -> SyncResult<Vec<DetailCandidate>> {
        let after = window.after().map(|t| t.timestamp()).unwrap_or(i64::MIN);
        let before = window.before().map(|t| t.timestamp()).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT strava_id, start_ts FROM activity_summary
             WHERE start_ts >= ?1 AND start_ts < ?2 AND (?3 = 0 OR has_details = 0)
             ORDER BY start_ts ASC, strava_id ASC",
        )?;
        let rows = stmt.query_map(params![after, before, only_missing], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut candidates = Vec::new();
        for row in rows {
            let (id, start_ts) = row?;
            candidates.push(DetailCandidate {
                id,
                start: from_epoch(start_ts)?,
            });
        }
        Ok(candidates)
    }
}

fn from_epoch(ts: i64) -> SyncResult<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| SyncError::Persistence(format!("timestamp out of range: {ts}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn open_on_disk_creates_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("export.sqlite3");
        {
            let store = ActivityStore::open(&path).expect("open");
            assert_eq!(store.count_summaries().unwrap(), 0);
        }
        // Reopening runs no migration twice.
        let store = ActivityStore::open(&path).expect("reopen");
        assert_eq!(store.count_summaries().unwrap(), 0);
    }

    #[test]
    fn lookups_on_empty_store_return_none() {
        let store = ActivityStore::open_in_memory().expect("store");
        assert_eq!(store.summary_checksum(1).unwrap(), None);
        assert_eq!(store.detail_checksum(1).unwrap(), None);
        assert_eq!(store.get_summary(1).unwrap(), None);
        assert_eq!(store.get_detail(1).unwrap(), None);
    }
}
