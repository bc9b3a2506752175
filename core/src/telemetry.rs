//! Spin telemetry: the audit and balancing feed.
//!
//! RULE: Telemetry is fire-and-forget. A sink error is logged and
//! dropped; it never fails or delays a committed spin.

use crate::{
    reward::Category,
    selection::{SpinOutcome, WeightedReward},
    state::{StateDelta, UserSpinState},
    types::{RewardId, SpinId, Tier, Timestamp, UserId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Full decision context for one committed spin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinEvent {
    pub spin_id:         SpinId,
    pub user_id:         UserId,
    pub tier:            Tier,
    pub timestamp:       Timestamp,
    pub draw:            f64,
    pub pity_before:     u32,
    pub pity_after:      u32,
    pub pity_active:     bool,
    pub total_weight:    f64,
    pub weights:         Vec<WeightedReward>,
    pub reward_id:       RewardId,
    pub category:        Category,
    pub was_pity:        bool,
    pub inventory_after: BTreeMap<Tier, u32>,
    /// Commit attempts it took, 1 when uncontended.
    pub attempts:        u32,
}

impl SpinEvent {
    pub fn from_outcome(
        user_id: &str,
        before: &UserSpinState,
        after: &UserSpinState,
        outcome: &SpinOutcome,
        attempts: u32,
    ) -> Self {
        let StateDelta { result, pity_counter, .. } = &outcome.delta;
        Self {
            spin_id:         result.id,
            user_id:         user_id.to_string(),
            tier:            result.tier,
            timestamp:       result.timestamp,
            draw:            outcome.draw,
            pity_before:     before.pity_counter,
            pity_after:      *pity_counter,
            pity_active:     outcome.weights.pity_active,
            total_weight:    outcome.weights.total,
            weights:         outcome.weights.rows.clone(),
            reward_id:       result.reward_id.clone(),
            category:        result.category,
            was_pity:        result.was_pity,
            inventory_after: after.available_spins.clone(),
            attempts,
        }
    }
}

/// Sinks run on the spinning thread after the commit, so `record` must
/// be cheap. A sink that talks to a slow service should hand the event
/// to its own queue and return.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &SpinEvent) -> anyhow::Result<()>;
}

/// Writes each event as one structured log line.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn record(&self, event: &SpinEvent) -> anyhow::Result<()> {
        log::info!(target: "spin_telemetry", "{}", serde_json::to_string(event)?);
        Ok(())
    }
}

/// Send `event` to every sink, swallowing failures.
pub fn emit(sinks: &[Box<dyn TelemetrySink>], event: &SpinEvent) {
    for sink in sinks {
        if let Err(e) = sink.record(event) {
            log::warn!("telemetry dropped for spin_id={}: {e:#}", event.spin_id);
        }
    }
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for std::sync::Arc<T> {
    fn record(&self, event: &SpinEvent) -> anyhow::Result<()> {
        (**self).record(event)
    }
}
