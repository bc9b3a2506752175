//! Reward catalogs, rarity rules and engine tunables.
//!
//! Loaded once from the data/ directory and validated before the
//! engine ever sees it. Lookups are pure.

use crate::{
    error::{WheelError, WheelResult},
    reward::{AdaptiveRule, Category, RewardDefinition, RewardPayload},
    types::Tier,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const DEFAULT_PITY_THRESHOLD: u32 = 10;
pub const DEFAULT_PITY_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_HISTORY_CAP: usize = 10;
pub const DEFAULT_EXTRA_SPIN_STREAK_MULTIPLIER: f64 = 0.6;
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Canonical order. Selection walks it front to back.
    pub catalog:         Vec<RewardDefinition>,
    #[serde(default)]
    pub rare_categories: HashSet<Category>,
    /// Inventory a brand-new user starts with for this tier.
    #[serde(default)]
    pub default_spins:   u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunables {
    #[serde(default = "default_pity_threshold")]
    pub pity_threshold:               u32,
    #[serde(default = "default_pity_multiplier")]
    pub pity_multiplier:              f64,
    #[serde(default = "default_history_cap")]
    pub history_cap:                  usize,
    #[serde(default = "default_extra_spin_streak_multiplier")]
    pub extra_spin_streak_multiplier: f64,
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts:          u32,
}

fn default_pity_threshold() -> u32 { DEFAULT_PITY_THRESHOLD }
fn default_pity_multiplier() -> f64 { DEFAULT_PITY_MULTIPLIER }
fn default_history_cap() -> usize { DEFAULT_HISTORY_CAP }
fn default_extra_spin_streak_multiplier() -> f64 { DEFAULT_EXTRA_SPIN_STREAK_MULTIPLIER }
fn default_max_commit_attempts() -> u32 { DEFAULT_MAX_COMMIT_ATTEMPTS }

impl Default for Tunables {
    fn default() -> Self {
        Self {
            pity_threshold:               DEFAULT_PITY_THRESHOLD,
            pity_multiplier:              DEFAULT_PITY_MULTIPLIER,
            history_cap:                  DEFAULT_HISTORY_CAP,
            extra_spin_streak_multiplier: DEFAULT_EXTRA_SPIN_STREAK_MULTIPLIER,
            max_commit_attempts:          DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }
}

// ── On-disk shapes ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct TierEntry {
    tier: Tier,
    #[serde(flatten)]
    config: TierConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct TiersFile {
    tiers: Vec<TierEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct AdaptiveRuleEntry {
    category: Category,
    #[serde(flatten)]
    rule: AdaptiveRule,
}

#[derive(Debug, Clone, Deserialize)]
struct AdaptiveRulesFile {
    rules: Vec<AdaptiveRuleEntry>,
}

// ── WheelConfig ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WheelConfig {
    pub tiers:          HashMap<Tier, TierConfig>,
    pub adaptive_rules: HashMap<Category, AdaptiveRule>,
    pub tunables:       Tunables,
}

impl WheelConfig {
    /// Load from the data/ directory.
    /// In tests, use WheelConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let tiers_path = format!("{data_dir}/catalog/tiers.json");
        let tiers_content = std::fs::read_to_string(&tiers_path)
            .with_context(|| format!("Cannot read {tiers_path}"))?;
        let tiers_file: TiersFile = serde_json::from_str(&tiers_content)
            .with_context(|| format!("Cannot parse {tiers_path}"))?;

        let mut tiers = HashMap::new();
        for entry in tiers_file.tiers {
            if tiers.insert(entry.tier, entry.config).is_some() {
                anyhow::bail!("{tiers_path}: tier '{}' configured twice", entry.tier);
            }
        }

        let rules_path = format!("{data_dir}/catalog/adaptive_rules.json");
        let rules_content = std::fs::read_to_string(&rules_path)
            .with_context(|| format!("Cannot read {rules_path}"))?;
        let rules_file: AdaptiveRulesFile = serde_json::from_str(&rules_content)
            .with_context(|| format!("Cannot parse {rules_path}"))?;
        let adaptive_rules = rules_file
            .rules
            .into_iter()
            .map(|r| (r.category, r.rule))
            .collect();

        // Tunables are optional; every field has a default.
        let engine_path = format!("{data_dir}/engine.json");
        let tunables = match std::fs::read_to_string(&engine_path) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Cannot parse {engine_path}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tunables::default(),
            Err(e) => return Err(e).with_context(|| format!("Cannot read {engine_path}")),
        };

        let config = Self { tiers, adaptive_rules, tunables };
        config.validate()?;
        log::info!(
            "Loaded wheel config: {} tiers, {} adaptive rules",
            config.tiers.len(),
            config.adaptive_rules.len()
        );
        Ok(config)
    }

    /// Reject configuration the selection algorithm cannot run on.
    pub fn validate(&self) -> WheelResult<()> {
        let t = &self.tunables;
        if !(t.pity_multiplier.is_finite() && t.pity_multiplier >= 1.0) {
            return Err(WheelError::invalid_catalog(format!(
                "pity_multiplier must be >= 1.0, got {}", t.pity_multiplier
            )));
        }
        if t.history_cap == 0 {
            return Err(WheelError::invalid_catalog("history_cap must be at least 1"));
        }
        if !valid_multiplier(t.extra_spin_streak_multiplier) {
            return Err(WheelError::invalid_catalog(format!(
                "extra_spin_streak_multiplier must be in (0, 1], got {}",
                t.extra_spin_streak_multiplier
            )));
        }

        for (category, rule) in &self.adaptive_rules {
            if !valid_multiplier(rule.multiplier) {
                return Err(WheelError::invalid_catalog(format!(
                    "adaptive rule for {} has multiplier {} outside (0, 1]",
                    category.as_str(), rule.multiplier
                )));
            }
            if rule.duration_days == 0 {
                return Err(WheelError::invalid_catalog(format!(
                    "adaptive rule for {} has zero duration", category.as_str()
                )));
            }
        }

        for (tier, tier_config) in &self.tiers {
            if tier_config.catalog.is_empty() {
                return Err(WheelError::invalid_catalog(format!("tier {tier} has an empty catalog")));
            }
            let mut seen = HashSet::new();
            for def in &tier_config.catalog {
                if !seen.insert(def.id.as_str()) {
                    return Err(WheelError::invalid_catalog(format!(
                        "tier {tier} defines reward '{}' twice", def.id
                    )));
                }
                if !(def.base_weight.is_finite() && def.base_weight > 0.0) {
                    return Err(WheelError::invalid_catalog(format!(
                        "reward '{}' in tier {tier} has weight {}", def.id, def.base_weight
                    )));
                }
                if let Some(target) = def.payload.referenced_tier() {
                    if !self.tiers.contains_key(&target) {
                        return Err(WheelError::invalid_catalog(format!(
                            "reward '{}' in tier {tier} references unconfigured tier {target}",
                            def.id
                        )));
                    }
                }
                if matches!(def.payload, RewardPayload::ExtraSpin { .. })
                    != (def.category == Category::ExtraSpin)
                {
                    return Err(WheelError::invalid_catalog(format!(
                        "reward '{}' in tier {tier}: extra_spin payload and category must agree",
                        def.id
                    )));
                }
            }
        }
        Ok(())
    }

    // ── Lookups ──────────────────────────────────────────────────

    pub fn tier(&self, tier: Tier) -> WheelResult<&TierConfig> {
        self.tiers
            .get(&tier)
            .ok_or_else(|| WheelError::UnknownTier { tier: tier.to_string() })
    }

    pub fn catalog(&self, tier: Tier) -> WheelResult<&[RewardDefinition]> {
        Ok(&self.tier(tier)?.catalog)
    }

    pub fn rare_categories(&self, tier: Tier) -> WheelResult<&HashSet<Category>> {
        Ok(&self.tier(tier)?.rare_categories)
    }

    pub fn adaptive_rule(&self, category: Category) -> Option<&AdaptiveRule> {
        self.adaptive_rules.get(&category)
    }

    /// A definition is rare if flagged itself or if its category is in
    /// the tier's rare set.
    pub fn is_rare(&self, tier: Tier, def: &RewardDefinition) -> WheelResult<bool> {
        Ok(def.rare || self.rare_categories(tier)?.contains(&def.category))
    }

    /// Starting inventory for every configured tier.
    pub fn default_inventory(&self) -> impl Iterator<Item = (Tier, u32)> + '_ {
        self.tiers.iter().map(|(tier, c)| (*tier, c.default_spins))
    }

    /// Config with hardcoded defaults for use in tests.
    ///
    /// Rookie mirrors the shipped rookie catalog. Pro never grants pro
    /// spins, so its inventory only moves through explicit top-ups.
    pub fn default_test() -> Self {
        let rookie = TierConfig {
            catalog: vec![
                def("ticket_rookie", "Rookie Ticket", Category::Ticket, 0.28, false,
                    RewardPayload::Ticket { tier: Tier::Rookie, count: 1 }),
                def("extra_spin_rookie", "Extra Spin", Category::ExtraSpin, 0.28, false,
                    RewardPayload::ExtraSpin { tier: Tier::Rookie }),
                def("masterpass_rookie", "Masterpass (7 days)", Category::Masterpass, 0.10, true,
                    RewardPayload::Masterpass { days: 7 }),
                def("boost_50", "50 XP", Category::Xp, 0.12, false,
                    RewardPayload::Xp { amount: 50 }),
                def("boost_100", "100 XP", Category::Xp, 0.10, false,
                    RewardPayload::Xp { amount: 100 }),
                def("boost_200", "200 XP", Category::Xp, 0.09, false,
                    RewardPayload::Xp { amount: 200 }),
                def("ticket_pro", "Pro Ticket", Category::Ticket, 0.03, true,
                    RewardPayload::Ticket { tier: Tier::Pro, count: 1 }),
            ],
            rare_categories: HashSet::new(),
            default_spins: 1,
        };

        let pro = TierConfig {
            catalog: vec![
                def("ticket_pro_1", "Pro Ticket", Category::Ticket, 0.30, false,
                    RewardPayload::Ticket { tier: Tier::Pro, count: 1 }),
                def("boost_500", "500 XP", Category::Xp, 0.30, false,
                    RewardPayload::Xp { amount: 500 }),
                def("coins_250", "250 Coins", Category::Coins, 0.20, false,
                    RewardPayload::Coins { amount: 250 }),
                def("premium_3", "3 Premium Days", Category::Premium, 0.12, false,
                    RewardPayload::PremiumDays { days: 3 }),
                def("gift_card_10", "$10 Gift Card", Category::GiftCard, 0.05, false,
                    RewardPayload::GiftCard { value_cents: 1_000 }),
                def("extra_spin_rookie_pro", "Rookie Spin", Category::ExtraSpin, 0.03, false,
                    RewardPayload::ExtraSpin { tier: Tier::Rookie }),
            ],
            rare_categories: [Category::GiftCard, Category::Premium].into_iter().collect(),
            default_spins: 0,
        };

        let adaptive_rules = [
            (Category::Masterpass, AdaptiveRule { multiplier: 0.5, duration_days: 7 }),
            (Category::GiftCard,   AdaptiveRule { multiplier: 0.3, duration_days: 14 }),
        ]
        .into();

        Self {
            tiers: [(Tier::Rookie, rookie), (Tier::Pro, pro)].into(),
            adaptive_rules,
            tunables: Tunables::default(),
        }
    }
}

fn valid_multiplier(m: f64) -> bool {
    m.is_finite() && m > 0.0 && m <= 1.0
}

fn def(
    id: &str,
    label: &str,
    category: Category,
    base_weight: f64,
    rare: bool,
    payload: RewardPayload,
) -> RewardDefinition {
    RewardDefinition {
        id: id.into(),
        label: label.into(),
        category,
        base_weight,
        rare,
        payload,
    }
}
