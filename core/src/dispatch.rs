//! Reward dispatcher, the boundary to the services that fulfil rewards.
//!
//! RULE: The grant is written to the ledger as pending inside the same
//! commit that spends the spin, so a won reward can never be lost.
//! Delivery happens afterwards, outside any store lock. A failed grant
//! never rolls back the spin; it stays pending and is retried out of
//! band, keyed by spin id.

use crate::{
    error::WheelResult,
    reward::{RewardDefinition, RewardPayload},
    types::{RewardId, SpinId, Tier, Timestamp, UserId},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A concrete grant call for the fulfilment backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grant {
    Tickets { tier: Tier, count: u32 },
    Xp { amount: u32 },
    PremiumDays { days: u32 },
    Masterpass { days: u32 },
    GiftCard { value_cents: u32 },
    Coins { amount: u32 },
}

impl Grant {
    /// None for rewards the spin commit already fulfilled (extra spins).
    pub fn from_payload(payload: &RewardPayload) -> Option<Self> {
        match *payload {
            RewardPayload::Ticket { tier, count }     => Some(Self::Tickets { tier, count }),
            RewardPayload::Xp { amount }              => Some(Self::Xp { amount }),
            RewardPayload::PremiumDays { days }       => Some(Self::PremiumDays { days }),
            RewardPayload::Masterpass { days }        => Some(Self::Masterpass { days }),
            RewardPayload::GiftCard { value_cents }   => Some(Self::GiftCard { value_cents }),
            RewardPayload::Coins { amount }           => Some(Self::Coins { amount }),
            RewardPayload::ExtraSpin { .. }           => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantRequest {
    pub spin_id:   SpinId,
    pub user_id:   UserId,
    pub reward_id: RewardId,
    pub grant:     Grant,
    pub won_at:    Timestamp,
}

impl GrantRequest {
    /// The grant owed for winning `reward`, or None when the commit
    /// itself fulfils it.
    pub fn for_reward(
        user_id: &str,
        spin_id: SpinId,
        reward: &RewardDefinition,
        won_at: Timestamp,
    ) -> Option<Self> {
        Some(Self {
            spin_id,
            user_id: user_id.to_string(),
            reward_id: reward.id.clone(),
            grant: Grant::from_payload(&reward.payload)?,
            won_at,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    Pending,
    Fulfilled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingGrant {
    pub request:    GrantRequest,
    pub attempts:   u32,
    pub last_error: Option<String>,
}

/// The external service that issues tickets, XP, premium days and coins.
/// Must be idempotent on `request.spin_id`.
pub trait GrantBackend: Send + Sync {
    fn grant(&self, request: &GrantRequest) -> anyhow::Result<()>;
}

/// Durable record of grants owed. Rows are created pending by
/// `StateStore::commit`; the ledger only moves them along.
pub trait GrantLedger: Send + Sync {
    fn mark_fulfilled(&self, spin_id: SpinId) -> WheelResult<()>;
    fn mark_failed(&self, spin_id: SpinId, error: &str) -> WheelResult<()>;
    /// Oldest first.
    fn pending(&self, limit: usize) -> WheelResult<Vec<PendingGrant>>;
    fn grant_status(&self, spin_id: SpinId) -> WheelResult<Option<GrantStatus>>;
}

/// Backend that only logs. Used by the runner and for dry runs.
#[derive(Debug, Default)]
pub struct LoggingBackend;

impl GrantBackend for LoggingBackend {
    fn grant(&self, request: &GrantRequest) -> anyhow::Result<()> {
        log::info!(
            "grant spin_id={} user={} reward={} grant={:?}",
            request.spin_id, request.user_id, request.reward_id, request.grant
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryReport {
    pub attempted: usize,
    pub fulfilled: usize,
    pub still_pending: usize,
}

pub struct RewardDispatcher<L> {
    ledger:  Arc<L>,
    backend: Arc<dyn GrantBackend>,
}

impl<L: GrantLedger> RewardDispatcher<L> {
    pub fn new(ledger: Arc<L>, backend: Arc<dyn GrantBackend>) -> Self {
        Self { ledger, backend }
    }

    /// Deliver a grant that was recorded pending by the spin commit.
    /// Returns the ledger status afterwards. A grant already fulfilled
    /// is not sent again.
    ///
    /// Only ledger (database) errors surface here; backend failures are
    /// absorbed into the pending state.
    pub fn dispatch(&self, request: &GrantRequest) -> WheelResult<GrantStatus> {
        if self.ledger.grant_status(request.spin_id)? == Some(GrantStatus::Fulfilled) {
            log::debug!("grant for spin_id={} already fulfilled; skipping", request.spin_id);
            return Ok(GrantStatus::Fulfilled);
        }
        self.attempt(request)
    }

    /// Sweep up to `limit` pending grants and try each once more.
    pub fn retry_pending(&self, limit: usize) -> WheelResult<RetryReport> {
        let mut report = RetryReport::default();
        for pending in self.ledger.pending(limit)? {
            report.attempted += 1;
            match self.attempt(&pending.request)? {
                GrantStatus::Fulfilled => report.fulfilled += 1,
                GrantStatus::Pending   => report.still_pending += 1,
            }
        }
        if report.attempted > 0 {
            log::info!(
                "grant retry sweep: attempted={} fulfilled={} still_pending={}",
                report.attempted, report.fulfilled, report.still_pending
            );
        }
        Ok(report)
    }

    fn attempt(&self, request: &GrantRequest) -> WheelResult<GrantStatus> {
        match self.backend.grant(request) {
            Ok(()) => {
                self.ledger.mark_fulfilled(request.spin_id)?;
                Ok(GrantStatus::Fulfilled)
            }
            Err(e) => {
                log::warn!(
                    "grant failed spin_id={} user={} reward={}: {e:#}",
                    request.spin_id, request.user_id, request.reward_id
                );
                self.ledger.mark_failed(request.spin_id, &format!("{e:#}"))?;
                Ok(GrantStatus::Pending)
            }
        }
    }
}
