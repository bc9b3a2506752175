//! Per-user spin state.
//!
//! RULE: UserSpinState is only ever changed by applying a StateDelta
//! built by selection, or by an inventory top-up. Both go through the
//! store's compare-and-swap commit.

use crate::{
    config::WheelConfig,
    reward::Category,
    types::{RewardId, SpinId, Tier, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An odds suppression on one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveEntry {
    pub multiplier: f64,
    /// None means the entry only goes away when a rule clears it.
    pub expires_at: Option<Timestamp>,
}

impl AdaptiveEntry {
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(true, |at| now <= at)
    }
}

/// One committed spin. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinResult {
    pub id:           SpinId,
    pub tier:         Tier,
    pub reward_id:    RewardId,
    pub reward_label: String,
    pub category:     Category,
    pub timestamp:    Timestamp,
    pub was_pity:     bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserSpinState {
    pub pity_counter:         u32,
    pub adaptive_multipliers: BTreeMap<Category, AdaptiveEntry>,
    pub available_spins:      BTreeMap<Tier, u32>,
    /// Newest first.
    pub spin_history:         Vec<SpinResult>,
}

impl UserSpinState {
    /// State for a user who has never spun.
    pub fn fresh(config: &WheelConfig) -> Self {
        Self {
            available_spins: config.default_inventory().collect(),
            ..Self::default()
        }
    }

    pub fn available(&self, tier: Tier) -> u32 {
        self.available_spins.get(&tier).copied().unwrap_or(0)
    }

    /// Multiplier currently in force for `category`; 1.0 when absent or expired.
    pub fn adaptive_factor(&self, category: Category, now: Timestamp) -> f64 {
        self.adaptive_multipliers
            .get(&category)
            .filter(|entry| entry.is_active(now))
            .map_or(1.0, |entry| entry.multiplier)
    }

    pub fn last_spin(&self) -> Option<&SpinResult> {
        self.spin_history.first()
    }

    /// Physically drop entries that are already logically absent.
    pub fn prune_expired(&mut self, now: Timestamp) {
        self.adaptive_multipliers.retain(|_, entry| entry.is_active(now));
    }

    pub fn credit_spins(&mut self, tier: Tier, count: u32) {
        let slot = self.available_spins.entry(tier).or_insert(0);
        *slot = slot.saturating_add(count);
    }
}

/// Everything one committed spin changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub tier:            Tier,
    pub pity_counter:    u32,
    pub adaptive_set:    Vec<(Category, AdaptiveEntry)>,
    pub adaptive_clear:  Vec<Category>,
    /// Tier credited with one spin by an extra-spin reward.
    pub extra_spin_tier: Option<Tier>,
    pub result:          SpinResult,
}

impl StateDelta {
    /// Produce the post-spin state. `base` must be the state the delta
    /// was computed from; the store's version check enforces that.
    pub fn apply(&self, base: &UserSpinState, history_cap: usize) -> UserSpinState {
        let mut next = base.clone();
        let now = self.result.timestamp;

        next.pity_counter = self.pity_counter;

        next.prune_expired(now);
        for category in &self.adaptive_clear {
            next.adaptive_multipliers.remove(category);
        }
        for (category, entry) in &self.adaptive_set {
            next.adaptive_multipliers.insert(*category, *entry);
        }

        let slot = next.available_spins.entry(self.tier).or_insert(0);
        *slot = slot.saturating_sub(1);
        if let Some(bonus_tier) = self.extra_spin_tier {
            next.credit_spins(bonus_tier, 1);
        }

        next.spin_history.insert(0, self.result.clone());
        next.spin_history.truncate(history_cap);
        next
    }
}
