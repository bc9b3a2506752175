//! Spin audit log backed by the spin_event table.

use super::SqliteStore;
use crate::{
    error::WheelResult,
    telemetry::{SpinEvent, TelemetrySink},
};
use rusqlite::params;

/// The audit row as persisted to SQLite.
#[derive(Debug, Clone)]
pub struct StoredSpinEvent {
    pub id:      i64,
    pub spin_id: String,
    pub tier:    String,
    pub payload: String, // JSON-serialized SpinEvent
}

impl StoredSpinEvent {
    pub fn decode(&self) -> WheelResult<SpinEvent> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

impl SqliteStore {
    pub fn append_spin_event(&self, event: &SpinEvent) -> WheelResult<()> {
        self.conn().execute(
            "INSERT INTO spin_event (spin_id, user_id, tier, reward_id, was_pity, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.spin_id.to_string(),
                event.user_id,
                event.tier.as_str(),
                event.reward_id,
                event.was_pity as i64,
                serde_json::to_string(event)?,
                event.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// A user's audit trail, oldest first.
    pub fn events_for_user(&self, user_id: &str) -> WheelResult<Vec<StoredSpinEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, spin_id, tier, payload
             FROM spin_event WHERE user_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![user_id], |row| {
                Ok(StoredSpinEvent {
                    id:      row.get(0)?,
                    spin_id: row.get(1)?,
                    tier:    row.get(2)?,
                    payload: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Per-reward win counts across all users, most frequent first.
    pub fn reward_counts(&self, tier: &str) -> WheelResult<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT reward_id, COUNT(*) FROM spin_event
             WHERE tier = ?1
             GROUP BY reward_id ORDER BY COUNT(*) DESC, reward_id ASC",
        )?;
        let rows = stmt
            .query_map(params![tier], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn pity_spin_count(&self, tier: &str) -> WheelResult<i64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM spin_event WHERE tier = ?1 AND was_pity = 1",
            params![tier],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl TelemetrySink for SqliteStore {
    fn record(&self, event: &SpinEvent) -> anyhow::Result<()> {
        self.append_spin_event(event)?;
        Ok(())
    }
}
