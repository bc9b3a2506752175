//! The selection algorithm.
//!
//! Pure: (config, tier, state, draw, now) → (reward, delta). No I/O.
//!
//! ORDER OF EFFECTS (fixed):
//!   1. Pity is evaluated against the counter *before* this spin.
//!   2. Adjusted weight = base × adaptive factor × pity factor.
//!   3. Weights are renormalised; the first cumulative boundary above
//!      the draw wins, so catalog order breaks ties.
//!   4. Pity, adaptive suppression, inventory and history updates are
//!      packed into one StateDelta for a single commit.

use crate::{
    config::WheelConfig,
    error::{WheelError, WheelResult},
    reward::{Category, RewardDefinition},
    state::{AdaptiveEntry, SpinResult, StateDelta, UserSpinState},
    types::{RewardId, SpinId, Tier, Timestamp},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// One catalog row after modulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedReward {
    pub reward_id:       RewardId,
    pub category:        Category,
    pub rare:            bool,
    pub base_weight:     f64,
    pub adaptive_factor: f64,
    pub pity_factor:     f64,
    pub adjusted_weight: f64,
    pub probability:     f64,
    /// Upper cumulative boundary; the last row is pinned to 1.0.
    pub cumulative:      f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    pub tier:        Tier,
    pub pity_active: bool,
    pub total:       f64,
    pub rows:        Vec<WeightedReward>,
}

impl WeightTable {
    /// Index of the first row whose boundary lies above `r`.
    pub fn pick(&self, r: f64) -> usize {
        self.rows
            .iter()
            .position(|row| row.cumulative > r)
            .unwrap_or(self.rows.len().saturating_sub(1))
    }
}

#[derive(Debug, Clone)]
pub struct SpinOutcome {
    pub reward:  RewardDefinition,
    pub weights: WeightTable,
    pub draw:    f64,
    pub delta:   StateDelta,
}

/// Compute the modulated odds a user would face on `tier` right now.
pub fn weigh(
    config: &WheelConfig,
    tier: Tier,
    state: &UserSpinState,
    now: Timestamp,
) -> WheelResult<WeightTable> {
    let catalog = config.catalog(tier)?;
    let tunables = &config.tunables;
    let pity_active = state.pity_counter >= tunables.pity_threshold;

    let mut rows = Vec::with_capacity(catalog.len());
    for def in catalog {
        let rare = config.is_rare(tier, def)?;
        let adaptive_factor = state.adaptive_factor(def.category, now);
        let pity_factor = if pity_active && rare { tunables.pity_multiplier } else { 1.0 };
        rows.push(WeightedReward {
            reward_id: def.id.clone(),
            category: def.category,
            rare,
            base_weight: def.base_weight,
            adaptive_factor,
            pity_factor,
            adjusted_weight: def.base_weight * adaptive_factor * pity_factor,
            probability: 0.0,
            cumulative: 0.0,
        });
    }

    let total: f64 = rows.iter().map(|r| r.adjusted_weight).sum();
    if !(total.is_finite() && total > 0.0) {
        log::error!("tier={tier} adjusted weights sum to {total}; catalog is unusable");
        return Err(WheelError::invalid_catalog(format!(
            "tier {tier} has total adjusted weight {total}"
        )));
    }

    let mut running = 0.0;
    for row in &mut rows {
        running += row.adjusted_weight;
        row.probability = row.adjusted_weight / total;
        row.cumulative = running / total;
    }
    if let Some(last) = rows.last_mut() {
        last.cumulative = 1.0;
    }

    Ok(WeightTable { tier, pity_active, total, rows })
}

/// Run one spin against `state` with the uniform draw `r` in [0, 1).
///
/// Fails with InsufficientSpins (and produces nothing) when the user
/// has no spin left on `tier`.
pub fn select(
    config: &WheelConfig,
    tier: Tier,
    state: &UserSpinState,
    r: f64,
    now: Timestamp,
    spin_id: SpinId,
) -> WheelResult<SpinOutcome> {
    config.tier(tier)?;
    if state.available(tier) < 1 {
        return Err(WheelError::InsufficientSpins { tier });
    }

    let weights = weigh(config, tier, state, now)?;
    let index = weights.pick(r);
    let reward = config.catalog(tier)?[index].clone();
    let is_rare = weights.rows[index].rare;

    let pity_counter = if is_rare { 0 } else { state.pity_counter.saturating_add(1) };

    let (adaptive_set, adaptive_clear) = adaptive_updates(config, state, reward.category, now);

    let result = SpinResult {
        id:           spin_id,
        tier,
        reward_id:    reward.id.clone(),
        reward_label: reward.label.clone(),
        category:     reward.category,
        timestamp:    now,
        was_pity:     weights.pity_active,
    };

    let delta = StateDelta {
        tier,
        pity_counter,
        adaptive_set,
        adaptive_clear,
        extra_spin_tier: reward.payload.extra_spin_tier(),
        result,
    };

    log::debug!(
        "tier={tier} r={r:.6} reward={} rare={is_rare} pity={}→{} pity_active={}",
        reward.id,
        state.pity_counter,
        pity_counter,
        weights.pity_active
    );

    Ok(SpinOutcome { reward, weights, draw: r, delta })
}

/// Suppression changes triggered by winning `won`.
///
/// A static rule overwrites the category's entry with a timed one.
/// Back-to-back extra spins add an open-ended suppression on extra
/// spins; any other win lifts it.
fn adaptive_updates(
    config: &WheelConfig,
    state: &UserSpinState,
    won: Category,
    now: Timestamp,
) -> (Vec<(Category, AdaptiveEntry)>, Vec<Category>) {
    let mut set = Vec::new();
    let mut clear = Vec::new();

    if let Some(rule) = config.adaptive_rule(won) {
        set.push((
            won,
            AdaptiveEntry {
                multiplier: rule.multiplier,
                expires_at: Some(now + Duration::days(i64::from(rule.duration_days))),
            },
        ));
    }

    let extra_spin_streak = won == Category::ExtraSpin
        && state.last_spin().is_some_and(|last| last.category == Category::ExtraSpin);

    if extra_spin_streak {
        set.push((
            Category::ExtraSpin,
            AdaptiveEntry {
                multiplier: config.tunables.extra_spin_streak_multiplier,
                expires_at: None,
            },
        ));
    } else if won != Category::ExtraSpin {
        clear.push(Category::ExtraSpin);
    }

    (set, clear)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 5, 10, 9, 30, 0).unwrap()
    }

    fn rookie_state(spins: u32) -> UserSpinState {
        let mut state = UserSpinState::default();
        state.credit_spins(Tier::Rookie, spins);
        state
    }

    #[test]
    fn base_boundaries_match_catalog_order() {
        let config = WheelConfig::default_test();
        let table = weigh(&config, Tier::Rookie, &rookie_state(1), now()).unwrap();
        let expected = [0.28, 0.56, 0.66, 0.78, 0.88, 0.97, 1.00];
        for (row, want) in table.rows.iter().zip(expected) {
            assert!((row.cumulative - want).abs() < 1e-9, "{} vs {want}", row.cumulative);
        }
        assert!(!table.pity_active);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let config = WheelConfig::default_test();
        let mut state = rookie_state(1);
        state.pity_counter = 25;
        state.adaptive_multipliers.insert(
            Category::Xp,
            AdaptiveEntry { multiplier: 0.2, expires_at: None },
        );
        for tier in [Tier::Rookie, Tier::Pro] {
            let table = weigh(&config, tier, &state, now()).unwrap();
            let sum: f64 = table.rows.iter().map(|r| r.probability).sum();
            assert!(table.total > 0.0);
            assert!((sum - 1.0).abs() < 1e-9, "tier {tier} sums to {sum}");
        }
    }

    #[test]
    fn boundary_equal_to_draw_goes_to_next_row() {
        let config = WheelConfig::default_test();
        let table = weigh(&config, Tier::Rookie, &rookie_state(1), now()).unwrap();
        let first_boundary = table.rows[0].cumulative;
        assert_eq!(table.pick(first_boundary), 1);
        assert_eq!(table.pick(0.0), 0);
        assert_eq!(table.pick(0.999_999_999), 6);
    }

    #[test]
    fn pity_example_renormalises_to_1_065() {
        let config = WheelConfig::default_test();
        let mut state = rookie_state(1);
        state.pity_counter = 10;
        let table = weigh(&config, Tier::Rookie, &state, now()).unwrap();
        assert!(table.pity_active);
        assert!((table.rows[2].adjusted_weight - 0.15).abs() < 1e-12);
        assert!((table.rows[6].adjusted_weight - 0.045).abs() < 1e-12);
        assert!((table.total - 1.065).abs() < 1e-12);
        assert!((table.rows[0].probability - 0.28 / 1.065).abs() < 1e-12);
    }

    #[test]
    fn extra_spin_streak_sets_open_ended_suppression() {
        let config = WheelConfig::default_test();
        let mut state = rookie_state(2);
        // r = 0.4 lands on extra_spin_rookie (0.28..0.56).
        let first = select(&config, Tier::Rookie, &state, 0.4, now(), SpinId::nil()).unwrap();
        assert!(first.delta.adaptive_set.is_empty());
        state = first.delta.apply(&state, 10);

        let second = select(&config, Tier::Rookie, &state, 0.4, now(), SpinId::nil()).unwrap();
        assert_eq!(second.reward.category, Category::ExtraSpin);
        assert_eq!(
            second.delta.adaptive_set,
            vec![(Category::ExtraSpin, AdaptiveEntry { multiplier: 0.6, expires_at: None })]
        );
    }

    #[test]
    fn streak_entry_replaces_a_static_extra_spin_rule() {
        let mut config = WheelConfig::default_test();
        config.adaptive_rules.insert(
            Category::ExtraSpin,
            crate::reward::AdaptiveRule { multiplier: 0.8, duration_days: 3 },
        );
        let mut state = rookie_state(2);

        let first = select(&config, Tier::Rookie, &state, 0.4, now(), SpinId::nil()).unwrap();
        state = first.delta.apply(&state, 10);
        assert_eq!(
            state.adaptive_multipliers[&Category::ExtraSpin],
            AdaptiveEntry { multiplier: 0.8, expires_at: Some(now() + Duration::days(3)) }
        );

        let second = select(&config, Tier::Rookie, &state, 0.4, now(), SpinId::nil()).unwrap();
        assert_eq!(second.reward.category, Category::ExtraSpin);
        let next = second.delta.apply(&state, 10);
        assert_eq!(
            next.adaptive_multipliers[&Category::ExtraSpin],
            AdaptiveEntry { multiplier: 0.6, expires_at: None }
        );
    }

    #[test]
    fn non_extra_spin_win_lifts_extra_spin_suppression() {
        let config = WheelConfig::default_test();
        let mut state = rookie_state(1);
        state.adaptive_multipliers.insert(
            Category::ExtraSpin,
            AdaptiveEntry { multiplier: 0.6, expires_at: None },
        );
        let outcome = select(&config, Tier::Rookie, &state, 0.01, now(), SpinId::nil()).unwrap();
        assert_eq!(outcome.reward.id, "ticket_rookie");
        assert_eq!(outcome.delta.adaptive_clear, vec![Category::ExtraSpin]);
        let next = outcome.delta.apply(&state, 10);
        assert!(!next.adaptive_multipliers.contains_key(&Category::ExtraSpin));
    }

    #[test]
    fn static_rule_applies_timed_suppression() {
        let config = WheelConfig::default_test();
        let state = rookie_state(1);
        // 0.60 lands on masterpass_rookie (0.56..0.66).
        let outcome = select(&config, Tier::Rookie, &state, 0.60, now(), SpinId::nil()).unwrap();
        assert_eq!(outcome.reward.id, "masterpass_rookie");
        assert_eq!(outcome.delta.pity_counter, 0);
        let entry = outcome
            .delta
            .adaptive_set
            .iter()
            .find(|(c, _)| *c == Category::Masterpass)
            .map(|(_, e)| *e)
            .unwrap();
        assert_eq!(entry.multiplier, 0.5);
        assert_eq!(entry.expires_at, Some(now() + Duration::days(7)));
    }

    #[test]
    fn no_spins_no_outcome() {
        let config = WheelConfig::default_test();
        let err = select(&config, Tier::Rookie, &rookie_state(0), 0.5, now(), SpinId::nil())
            .unwrap_err();
        assert!(matches!(err, WheelError::InsufficientSpins { tier: Tier::Rookie }));
    }

    #[test]
    fn unknown_tier_is_reported_before_inventory() {
        let config = WheelConfig::default_test();
        let err = select(&config, Tier::Premium, &rookie_state(0), 0.5, now(), SpinId::nil())
            .unwrap_err();
        assert!(matches!(err, WheelError::UnknownTier { .. }));
    }

    #[test]
    fn all_zero_weights_are_invalid() {
        let mut config = WheelConfig::default_test();
        for def in &mut config.tiers.get_mut(&Tier::Rookie).unwrap().catalog {
            def.base_weight = 0.0;
        }
        let err = weigh(&config, Tier::Rookie, &rookie_state(1), now()).unwrap_err();
        assert!(matches!(err, WheelError::InvalidCatalog { .. }));
    }
}
