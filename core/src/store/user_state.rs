use super::{grant::insert_pending, SqliteStore, StateStore, Versioned};
use crate::{
    dispatch::GrantRequest,
    error::{WheelError, WheelResult},
    state::UserSpinState,
};
use rusqlite::{params, OptionalExtension};

impl StateStore for SqliteStore {
    fn load(&self, user_id: &str) -> WheelResult<Versioned> {
        let row = self
            .conn()
            .query_row(
                "SELECT version, pity_counter, adaptive_json, inventory_json, history_json
                 FROM user_spin_state WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((version, pity, adaptive, inventory, history)) = row else {
            return Ok(Versioned { version: 0, state: self.fresh.clone() });
        };

        Ok(Versioned {
            version: version as u64,
            state: UserSpinState {
                pity_counter:         pity as u32,
                adaptive_multipliers: serde_json::from_str(&adaptive)?,
                available_spins:      serde_json::from_str(&inventory)?,
                spin_history:         serde_json::from_str(&history)?,
            },
        })
    }

    fn commit(
        &self,
        user_id: &str,
        expected_version: u64,
        next: &UserSpinState,
        grant: Option<&GrantRequest>,
    ) -> WheelResult<u64> {
        let adaptive = serde_json::to_string(&next.adaptive_multipliers)?;
        let inventory = serde_json::to_string(&next.available_spins)?;
        let history = serde_json::to_string(&next.spin_history)?;
        let new_version = expected_version + 1;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let changed = if expected_version == 0 {
            tx.execute(
                "INSERT INTO user_spin_state
                    (user_id, version, pity_counter, adaptive_json, inventory_json, history_json)
                 VALUES (?1, 1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (user_id) DO NOTHING",
                params![user_id, next.pity_counter as i64, adaptive, inventory, history],
            )?
        } else {
            tx.execute(
                "UPDATE user_spin_state
                 SET version = ?1, pity_counter = ?2, adaptive_json = ?3,
                     inventory_json = ?4, history_json = ?5
                 WHERE user_id = ?6 AND version = ?7",
                params![
                    new_version as i64,
                    next.pity_counter as i64,
                    adaptive,
                    inventory,
                    history,
                    user_id,
                    expected_version as i64,
                ],
            )?
        };

        if changed == 0 {
            log::debug!("user={user_id} commit lost race at version {expected_version}");
            return Err(WheelError::ConcurrentModification { user_id: user_id.to_string() });
        }
        if let Some(request) = grant {
            if !insert_pending(&tx, request)? {
                log::debug!("grant for spin_id={} already in ledger", request.spin_id);
            }
        }
        tx.commit()?;
        Ok(new_version)
    }
}

impl SqliteStore {
    /// Number of users with a persisted row (for tests and summaries).
    pub fn user_count(&self) -> WheelResult<i64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM user_spin_state", [], |row| row.get(0))?;
        Ok(count)
    }
}
