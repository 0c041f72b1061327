//! Idempotent writes of exported records, one transaction per record.

use rusqlite::{Transaction, params};

use crate::error::{SyncError, SyncResult};
use crate::model::{ActivityRecord, DetailRecord, SummaryRecord};
use crate::store::ActivityStore;
use crate::strategy::Decision;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistedOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl ActivityStore {
    /// Apply `decision` for `record`. A failure rolls the whole record back.
    pub fn upsert(
        &mut self,
        record: &ActivityRecord,
        decision: Decision,
    ) -> SyncResult<PersistedOutcome> {
        if !decision.writes() {
            return Ok(PersistedOutcome::Unchanged);
        }
        // Dropping the transaction without commit rolls it back.
        let tx = self.conn.transaction()?;
        match record {
            ActivityRecord::Summary(summary) => write_summary(&tx, summary)?,
            ActivityRecord::Detail(detail) => write_detail(&tx, detail)?,
        }
        tx.commit()?;
        Ok(match decision {
            Decision::Insert => PersistedOutcome::Inserted,
            _ => PersistedOutcome::Updated,
        })
    }
}

// `has_details` belongs to the detail pass and is never touched here.
fn write_summary(tx: &Transaction<'_>, s: &SummaryRecord) -> SyncResult<()> {
    tx.execute(
        "INSERT INTO activity_summary
             (strava_id, start_ts, end_ts, name, sport_type, payload, checksum)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(strava_id) DO UPDATE SET
             start_ts = excluded.start_ts,
             end_ts = excluded.end_ts,
             name = excluded.name,
             sport_type = excluded.sport_type,
             payload = excluded.payload,
             checksum = excluded.checksum,
             updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')",
        params![
            s.id,
            s.start.timestamp(),
            s.end.timestamp(),
            s.name,
            s.sport_type,
            s.payload,
            s.checksum.as_str(),
        ],
    )?;
    Ok(())
}

fn write_detail(tx: &Transaction<'_>, d: &DetailRecord) -> SyncResult<()> {
    let linked = tx.execute(
        "UPDATE activity_summary SET has_details = 1 WHERE strava_id = ?1",
        params![d.id],
    )?;
    if linked == 0 {
        return Err(SyncError::Persistence(format!(
            "no summary stored for activity {}, cannot attach details",
            d.id
        )));
    }
    tx.execute(
        "INSERT INTO activity_detail (strava_id, description, payload, checksum)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(strava_id) DO UPDATE SET
             description = excluded.description,
             payload = excluded.payload,
             checksum = excluded.checksum,
             updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')",
        params![d.id, d.description, d.payload, d.checksum.as_str()],
    )?;
    Ok(())
}
