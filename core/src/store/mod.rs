//! Persistence for per-user spin state, the grant ledger and the
//! spin audit log.
//!
//! RULE: Only store/ talks to the database.
//! The engine goes through the StateStore, GrantLedger and
//! TelemetrySink traits. It never executes SQL directly.
//!
//! Atomicity is optimistic: every user row carries a version, and a
//! commit only lands if the version it was computed from is still the
//! current one. A lost race surfaces as ConcurrentModification and the
//! caller recomputes from a fresh read. The grant owed for the spin is
//! recorded in the same commit, never in a separate write.

use crate::{dispatch::GrantRequest, error::WheelResult, state::UserSpinState};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

mod event;
mod grant;
mod memory;
mod user_state;

pub use event::StoredSpinEvent;
pub use memory::MemoryStore;

/// A user's state together with the version it was read at.
/// Version 0 means the user has never been persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub version: u64,
    pub state:   UserSpinState,
}

pub trait StateStore: Send + Sync {
    /// Read a user's state, or a fresh default (version 0) if the user
    /// has no record yet. Reading never persists anything.
    fn load(&self, user_id: &str) -> WheelResult<Versioned>;

    /// Replace the user's state iff it is still at `expected_version`,
    /// and in the same atomic step record `grant` as pending in the
    /// ledger. Returns the new version. Fails with ConcurrentModification
    /// if another writer got there first; then nothing is written.
    fn commit(
        &self,
        user_id: &str,
        expected_version: u64,
        next: &UserSpinState,
        grant: Option<&GrantRequest>,
    ) -> WheelResult<u64>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// Handed out for users without a row.
    fresh: UserSpinState,
}

impl SqliteStore {
    pub fn open(path: &str, fresh: UserSpinState) -> WheelResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn: Mutex::new(conn), fresh })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory(fresh: UserSpinState) -> WheelResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn: Mutex::new(conn), fresh })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> WheelResult<()> {
        let conn = self.conn();
        conn.execute_batch(include_str!("../../../migrations/001_spin_state.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/002_grants_and_events.sql"))?;
        Ok(())
    }

    /// Open a migrated in-memory store; the common test setup.
    pub fn in_memory_migrated(fresh: UserSpinState) -> WheelResult<Self> {
        let store = Self::in_memory(fresh)?;
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}
