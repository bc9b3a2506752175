//! Grant ledger backed by the grant_ledger table.

use super::SqliteStore;
use crate::{
    dispatch::{GrantLedger, GrantRequest, GrantStatus, PendingGrant},
    error::{WheelError, WheelResult},
    types::SpinId,
};
use rusqlite::{params, Connection, OptionalExtension};

/// Insert `request` as pending. Returns false if the spin id is
/// already in the ledger. Called inside the state commit transaction.
pub(super) fn insert_pending(conn: &Connection, request: &GrantRequest) -> WheelResult<bool> {
    let inserted = conn.execute(
        "INSERT INTO grant_ledger (spin_id, user_id, reward_id, grant_json, status, won_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5)
         ON CONFLICT (spin_id) DO NOTHING",
        params![
            request.spin_id.to_string(),
            request.user_id,
            request.reward_id,
            serde_json::to_string(&request.grant)?,
            request.won_at.to_rfc3339(),
        ],
    )?;
    Ok(inserted == 1)
}

impl GrantLedger for SqliteStore {
    fn mark_fulfilled(&self, spin_id: SpinId) -> WheelResult<()> {
        self.conn().execute(
            "UPDATE grant_ledger SET status = 'fulfilled', attempts = attempts + 1, last_error = NULL
             WHERE spin_id = ?1",
            params![spin_id.to_string()],
        )?;
        Ok(())
    }

    fn mark_failed(&self, spin_id: SpinId, error: &str) -> WheelResult<()> {
        self.conn().execute(
            "UPDATE grant_ledger SET attempts = attempts + 1, last_error = ?1
             WHERE spin_id = ?2 AND status = 'pending'",
            params![error, spin_id.to_string()],
        )?;
        Ok(())
    }

    fn pending(&self, limit: usize) -> WheelResult<Vec<PendingGrant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT spin_id, user_id, reward_id, grant_json, won_at, attempts, last_error
             FROM grant_ledger WHERE status = 'pending'
             ORDER BY won_at ASC, spin_id ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(spin_id, user_id, reward_id, grant_json, won_at, attempts, last_error)| {
                Ok(PendingGrant {
                    request: GrantRequest {
                        spin_id: parse_spin_id(&spin_id)?,
                        user_id,
                        reward_id,
                        grant: serde_json::from_str(&grant_json)?,
                        won_at: chrono::DateTime::parse_from_rfc3339(&won_at)
                            .map_err(|e| anyhow::anyhow!("bad won_at '{won_at}': {e}"))?
                            .with_timezone(&chrono::Utc),
                    },
                    attempts: attempts as u32,
                    last_error,
                })
            })
            .collect()
    }

    fn grant_status(&self, spin_id: SpinId) -> WheelResult<Option<GrantStatus>> {
        let status: Option<String> = self
            .conn()
            .query_row(
                "SELECT status FROM grant_ledger WHERE spin_id = ?1",
                params![spin_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status.map(|s| match s.as_str() {
            "fulfilled" => GrantStatus::Fulfilled,
            _ => GrantStatus::Pending,
        }))
    }
}

fn parse_spin_id(raw: &str) -> WheelResult<SpinId> {
    SpinId::parse_str(raw)
        .map_err(|e| WheelError::Other(anyhow::anyhow!("bad spin id '{raw}': {e}")))
}
