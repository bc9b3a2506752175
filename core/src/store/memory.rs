//! In-process store with the same compare-and-swap contract as
//! SqliteStore. The user map lock is held while the grant is recorded,
//! so state and ledger change together. Nothing survives the process.

use super::{StateStore, Versioned};
use crate::{
    dispatch::{GrantLedger, GrantRequest, GrantStatus, PendingGrant},
    error::{WheelError, WheelResult},
    state::UserSpinState,
    types::{SpinId, UserId},
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct LedgerRow {
    seq:        u64,
    request:    GrantRequest,
    status:     GrantStatus,
    attempts:   u32,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    fresh:  UserSpinState,
    users:  Mutex<HashMap<UserId, Versioned>>,
    grants: Mutex<HashMap<SpinId, LedgerRow>>,
}

impl MemoryStore {
    pub fn new(fresh: UserSpinState) -> Self {
        Self { fresh, ..Self::default() }
    }

    pub fn user_count(&self) -> usize {
        lock(&self.users).len()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl StateStore for MemoryStore {
    fn load(&self, user_id: &str) -> WheelResult<Versioned> {
        Ok(lock(&self.users)
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| Versioned { version: 0, state: self.fresh.clone() }))
    }

    fn commit(
        &self,
        user_id: &str,
        expected_version: u64,
        next: &UserSpinState,
        grant: Option<&GrantRequest>,
    ) -> WheelResult<u64> {
        let mut users = lock(&self.users);
        let current = users.get(user_id).map_or(0, |v| v.version);
        if current != expected_version {
            return Err(WheelError::ConcurrentModification { user_id: user_id.to_string() });
        }
        if let Some(request) = grant {
            let mut grants = lock(&self.grants);
            let seq = grants.len() as u64;
            grants.entry(request.spin_id).or_insert_with(|| LedgerRow {
                seq,
                request:    request.clone(),
                status:     GrantStatus::Pending,
                attempts:   0,
                last_error: None,
            });
        }
        let version = expected_version + 1;
        users.insert(user_id.to_string(), Versioned { version, state: next.clone() });
        Ok(version)
    }
}

impl GrantLedger for MemoryStore {
    fn mark_fulfilled(&self, spin_id: SpinId) -> WheelResult<()> {
        if let Some(row) = lock(&self.grants).get_mut(&spin_id) {
            row.status = GrantStatus::Fulfilled;
            row.attempts += 1;
            row.last_error = None;
        }
        Ok(())
    }

    fn mark_failed(&self, spin_id: SpinId, error: &str) -> WheelResult<()> {
        if let Some(row) = lock(&self.grants).get_mut(&spin_id) {
            if row.status == GrantStatus::Pending {
                row.attempts += 1;
                row.last_error = Some(error.to_string());
            }
        }
        Ok(())
    }

    fn pending(&self, limit: usize) -> WheelResult<Vec<PendingGrant>> {
        let grants = lock(&self.grants);
        let mut rows: Vec<&LedgerRow> = grants
            .values()
            .filter(|r| r.status == GrantStatus::Pending)
            .collect();
        rows.sort_by_key(|r| r.seq);
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|r| PendingGrant {
                request:    r.request.clone(),
                attempts:   r.attempts,
                last_error: r.last_error.clone(),
            })
            .collect())
    }

    fn grant_status(&self, spin_id: SpinId) -> WheelResult<Option<GrantStatus>> {
        Ok(lock(&self.grants).get(&spin_id).map(|r| r.status))
    }
}
