//! The spin engine: the one operation the outside world calls.
//!
//! EXECUTION ORDER for spin() (fixed):
//!   1. Load the user's versioned state (fresh default if absent).
//!   2. Draw r and a spin id from the seeded DrawSource.
//!   3. Run selection against the loaded state. No I/O.
//!   4. Compare-and-swap commit of the new state together with the
//!      pending grant. On a lost race go back to 1 with a fresh read and
//!      a fresh draw, for at most max_commit_attempts attempts in total.
//!   5. Deliver the grant (best effort, no lock held).
//!   6. Emit telemetry (fire and forget, on the caller's thread).
//!
//! RULES:
//!   - Only step 4 writes user state. Failures before it change nothing.
//!   - Failures after it are logged, never returned.

use crate::{
    clock::{Clock, SystemClock},
    config::WheelConfig,
    dispatch::{
        GrantBackend, GrantLedger, GrantRequest, GrantStatus, LoggingBackend, RetryReport,
        RewardDispatcher,
    },
    error::{WheelError, WheelResult},
    reward::Category,
    rng::{DrawSource, SpinRng},
    selection::{self, SpinOutcome, WeightTable},
    state::UserSpinState,
    store::StateStore,
    telemetry::{self, SpinEvent, TelemetrySink},
    types::{RewardId, SpinId, Tier, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// What a caller gets back from a successful spin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinReceipt {
    pub spin_id:      SpinId,
    pub tier:         Tier,
    pub reward_id:    RewardId,
    pub reward_label: String,
    pub category:     Category,
    pub was_pity:     bool,
    pub timestamp:    Timestamp,
    /// None only when the reward needed no external grant.
    pub grant_status: Option<GrantStatus>,
}

pub struct SpinEngine<S> {
    config:     WheelConfig,
    store:      Arc<S>,
    draws:      Mutex<Box<dyn DrawSource>>,
    clock:      Arc<dyn Clock>,
    dispatcher: RewardDispatcher<S>,
    sinks:      Vec<Box<dyn TelemetrySink>>,
}

impl<S: StateStore + GrantLedger + 'static> SpinEngine<S> {
    /// Engine over `store` with a seeded RNG, the system clock and a
    /// logging-only grant backend.
    pub fn new(config: WheelConfig, store: Arc<S>, seed: u64) -> Self {
        Self {
            dispatcher: RewardDispatcher::new(Arc::clone(&store), Arc::new(LoggingBackend)),
            config,
            store,
            draws: Mutex::new(Box::new(SpinRng::new(seed, 0))),
            clock: Arc::new(SystemClock),
            sinks: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn GrantBackend>) -> Self {
        self.dispatcher = RewardDispatcher::new(Arc::clone(&self.store), backend);
        self
    }

    pub fn with_draws(mut self, draws: impl DrawSource + 'static) -> Self {
        self.draws = Mutex::new(Box::new(draws));
        self
    }

    pub fn with_sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn config(&self) -> &WheelConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Spin once for `user_id` on `tier`.
    pub fn spin(&self, user_id: &str, tier: Tier) -> WheelResult<SpinReceipt> {
        self.config.tier(tier)?;
        let max_attempts = self.config.tunables.max_commit_attempts.max(1);

        for attempt in 1..=max_attempts {
            let loaded = self.store.load(user_id)?;
            let now = self.clock.now();
            let (r, spin_id) = self.draw();

            let outcome = selection::select(&self.config, tier, &loaded.state, r, now, spin_id)?;
            let next = outcome.delta.apply(&loaded.state, self.config.tunables.history_cap);
            let grant = GrantRequest::for_reward(user_id, spin_id, &outcome.reward, now);

            match self.store.commit(user_id, loaded.version, &next, grant.as_ref()) {
                Ok(version) => {
                    log::debug!(
                        "user={user_id} tier={tier} spin_id={spin_id} reward={} version={version} attempt={attempt}",
                        outcome.reward.id
                    );
                    return Ok(self.after_commit(user_id, &loaded.state, &next, &outcome, grant, attempt));
                }
                Err(e) if e.is_retryable() => {
                    log::debug!("user={user_id} tier={tier} attempt={attempt} lost commit race; retrying");
                }
                Err(e) => return Err(e),
            }
        }

        log::warn!("user={user_id} tier={tier} gave up after {max_attempts} conflicting commits");
        Err(WheelError::TransientFailure { user_id: user_id.to_string(), attempts: max_attempts })
    }

    /// Credit `count` spins of `tier`. Returns the new balance.
    pub fn grant_spins(&self, user_id: &str, tier: Tier, count: u32) -> WheelResult<u32> {
        self.config.tier(tier)?;
        let max_attempts = self.config.tunables.max_commit_attempts.max(1);

        for _ in 0..max_attempts {
            let loaded = self.store.load(user_id)?;
            let mut next = loaded.state.clone();
            next.credit_spins(tier, count);
            match self.store.commit(user_id, loaded.version, &next, None) {
                Ok(_) => {
                    log::debug!("user={user_id} tier={tier} credited {count} spins");
                    return Ok(next.available(tier));
                }
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(WheelError::TransientFailure { user_id: user_id.to_string(), attempts: max_attempts })
    }

    /// The odds `user_id` would face on `tier` right now.
    pub fn odds(&self, user_id: &str, tier: Tier) -> WheelResult<WeightTable> {
        let loaded = self.store.load(user_id)?;
        selection::weigh(&self.config, tier, &loaded.state, self.clock.now())
    }

    pub fn state(&self, user_id: &str) -> WheelResult<UserSpinState> {
        Ok(self.store.load(user_id)?.state)
    }

    /// Re-attempt up to `limit` grants the backend previously refused.
    pub fn retry_pending_grants(&self, limit: usize) -> WheelResult<RetryReport> {
        self.dispatcher.retry_pending(limit)
    }

    fn draw(&self) -> (f64, SpinId) {
        let mut draws = self.draws.lock().unwrap_or_else(|e| e.into_inner());
        (draws.next_draw(), draws.next_spin_id())
    }

    fn after_commit(
        &self,
        user_id: &str,
        before: &UserSpinState,
        after: &UserSpinState,
        outcome: &SpinOutcome,
        grant: Option<GrantRequest>,
        attempts: u32,
    ) -> SpinReceipt {
        let result = &outcome.delta.result;

        // The grant is already durable as pending; a ledger error here
        // only means the retry sweep will pick it up.
        let grant_status = grant.map(|request| {
            self.dispatcher.dispatch(&request).unwrap_or_else(|e| {
                log::warn!("user={user_id} spin_id={} grant left pending: {e}", result.id);
                GrantStatus::Pending
            })
        });

        let event = SpinEvent::from_outcome(user_id, before, after, outcome, attempts);
        telemetry::emit(&self.sinks, &event);

        SpinReceipt {
            spin_id:      result.id,
            tier:         result.tier,
            reward_id:    result.reward_id.clone(),
            reward_label: result.reward_label.clone(),
            category:     result.category,
            was_pity:     result.was_pity,
            timestamp:    result.timestamp,
            grant_status,
        }
    }
}
