//! Per-user serialization: a spin is never paid for twice.

use spinwheel_core::{
    config::WheelConfig,
    dispatch::{GrantLedger, GrantRequest, GrantStatus, PendingGrant},
    engine::SpinEngine,
    error::{WheelError, WheelResult},
    state::UserSpinState,
    store::{MemoryStore, SqliteStore, StateStore, Versioned},
    types::{SpinId, Tier},
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn race_one_spin<S>(engine: Arc<SpinEngine<S>>, user_id: &str) -> Vec<WheelResult<String>>
where
    S: StateStore + GrantLedger + 'static,
{
    engine.grant_spins(user_id, Tier::Pro, 1).unwrap();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let user_id = user_id.to_string();
            thread::spawn(move || {
                barrier.wait();
                engine.spin(&user_id, Tier::Pro).map(|r| r.reward_id)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

fn assert_exactly_one_success(results: &[WheelResult<String>]) {
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "expected exactly one success, got {results:?}");
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(WheelError::InsufficientSpins { tier: Tier::Pro })))
        .count();
    assert_eq!(refused, 1, "loser must see InsufficientSpins, got {results:?}");
}

/// Pro never credits pro spins, so one pro spin can only be spent once.
#[test]
fn concurrent_spins_on_last_spin_memory_store() {
    let config = WheelConfig::default_test();
    let store = Arc::new(MemoryStore::new(UserSpinState::fresh(&config)));
    let engine = Arc::new(SpinEngine::new(config, store, 7));

    for n in 0..50 {
        let user_id = format!("racer-{n}");
        let results = race_one_spin(Arc::clone(&engine), &user_id);
        assert_exactly_one_success(&results);
        let state = engine.state(&user_id).unwrap();
        assert_eq!(state.available(Tier::Pro), 0);
        assert_eq!(state.spin_history.len(), 1);
    }
}

#[test]
fn concurrent_spins_on_last_spin_sqlite_store() {
    let config = WheelConfig::default_test();
    let store = Arc::new(SqliteStore::in_memory_migrated(UserSpinState::fresh(&config)).unwrap());
    let engine = Arc::new(SpinEngine::new(config, store, 7));

    for n in 0..20 {
        let user_id = format!("racer-{n}");
        let results = race_one_spin(Arc::clone(&engine), &user_id);
        assert_exactly_one_success(&results);
        assert!(engine.state(&user_id).unwrap().pity_counter <= 1);
    }
}

#[test]
fn many_threads_never_overspend() {
    let config = WheelConfig::default_test();
    let store = Arc::new(MemoryStore::new(UserSpinState::fresh(&config)));
    let engine = Arc::new(SpinEngine::new(config, store, 11));
    engine.grant_spins("crowd", Tier::Pro, 5).unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut wins = 0;
                for _ in 0..4 {
                    match engine.spin("crowd", Tier::Pro) {
                        Ok(_) => wins += 1,
                        Err(WheelError::InsufficientSpins { .. }) => {}
                        Err(WheelError::TransientFailure { .. }) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                wins
            })
        })
        .collect();

    let total_wins: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    let state = engine.state("crowd").unwrap();
    assert_eq!(total_wins as usize, state.spin_history.len());
    assert!(total_wins <= 5);
    assert_eq!(state.available(Tier::Pro), 5 - total_wins);
}

#[test]
fn cross_user_spins_do_not_conflict() {
    let config = WheelConfig::default_test();
    let store = Arc::new(MemoryStore::new(UserSpinState::fresh(&config)));
    let engine = Arc::new(SpinEngine::new(config, store, 3));

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.spin(&format!("solo-{n}"), Tier::Rookie))
        })
        .collect();

    for h in handles {
        h.join().unwrap().expect("independent users never contend");
    }
}

// ── Retry exhaustion ─────────────────────────────────────────────────────────

/// A store where some other writer always wins.
struct AlwaysContended {
    inner: MemoryStore,
    commits: AtomicU32,
}

impl StateStore for AlwaysContended {
    fn load(&self, user_id: &str) -> WheelResult<Versioned> {
        self.inner.load(user_id)
    }

    fn commit(
        &self,
        user_id: &str,
        _expected: u64,
        _next: &UserSpinState,
        _grant: Option<&GrantRequest>,
    ) -> WheelResult<u64> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Err(WheelError::ConcurrentModification { user_id: user_id.to_string() })
    }
}

impl GrantLedger for AlwaysContended {
    fn mark_fulfilled(&self, spin_id: SpinId) -> WheelResult<()> {
        self.inner.mark_fulfilled(spin_id)
    }
    fn mark_failed(&self, spin_id: SpinId, error: &str) -> WheelResult<()> {
        self.inner.mark_failed(spin_id, error)
    }
    fn pending(&self, limit: usize) -> WheelResult<Vec<PendingGrant>> {
        self.inner.pending(limit)
    }
    fn grant_status(&self, spin_id: SpinId) -> WheelResult<Option<GrantStatus>> {
        self.inner.grant_status(spin_id)
    }
}

#[test]
fn exhausted_retries_surface_as_transient_failure() {
    let config = WheelConfig::default_test();
    let store = Arc::new(AlwaysContended {
        inner: MemoryStore::new(UserSpinState::fresh(&config)),
        commits: AtomicU32::new(0),
    });
    let engine = SpinEngine::new(config, Arc::clone(&store), 5);

    let err = engine.spin("unlucky", Tier::Rookie).unwrap_err();
    assert!(
        matches!(err, WheelError::TransientFailure { attempts: 5, .. }),
        "got {err}"
    );
    assert_eq!(store.commits.load(Ordering::SeqCst), 5);
    assert!(store.inner.pending(10).unwrap().is_empty());
    assert!(!err.is_retryable());
}
