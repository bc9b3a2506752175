//! Reward catalog model.
//!
//! RULE: A reward's effect is decoded once, at catalog load time, into
//! a typed RewardPayload. Nothing downstream inspects reward ids to
//! work out what a reward does.

use crate::types::{RewardId, Tier};
use serde::{Deserialize, Serialize};

/// Reward category. Adaptive suppression and rarity sets key on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Ticket,
    #[serde(alias = "spin")]
    ExtraSpin,
    Masterpass,
    Xp,
    Premium,
    GiftCard,
    Coins,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticket     => "ticket",
            Self::ExtraSpin  => "extra_spin",
            Self::Masterpass => "masterpass",
            Self::Xp         => "xp",
            Self::Premium    => "premium",
            Self::GiftCard   => "gift_card",
            Self::Coins      => "coins",
        }
    }
}

/// What a reward actually does once granted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardPayload {
    /// League entry tickets for the given tier.
    Ticket { tier: Tier, count: u32 },
    Xp { amount: u32 },
    PremiumDays { days: u32 },
    Masterpass { days: u32 },
    GiftCard { value_cents: u32 },
    Coins { amount: u32 },
    /// One additional spin of `tier`, credited inside the spin's own commit.
    ExtraSpin { tier: Tier },
}

impl RewardPayload {
    /// The tier whose inventory this reward credits, if any.
    pub fn extra_spin_tier(&self) -> Option<Tier> {
        match self {
            Self::ExtraSpin { tier } => Some(*tier),
            _ => None,
        }
    }

    /// Tier referenced by the payload. Used by config validation.
    pub fn referenced_tier(&self) -> Option<Tier> {
        match self {
            Self::Ticket { tier, .. } | Self::ExtraSpin { tier } => Some(*tier),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardDefinition {
    pub id:          RewardId,
    pub label:       String,
    pub category:    Category,
    pub base_weight: f64,
    /// Rarity attached to this definition regardless of its category.
    #[serde(default)]
    pub rare:        bool,
    pub payload:     RewardPayload,
}

/// Temporary suppression applied to a category right after it is won.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveRule {
    pub multiplier:    f64,
    pub duration_days: u32,
}
