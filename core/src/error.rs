use crate::types::Tier;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WheelError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown tier '{tier}'")]
    UnknownTier { tier: String },

    #[error("Invalid catalog: {reason}")]
    InvalidCatalog { reason: String },

    #[error("No spins left for tier {tier}")]
    InsufficientSpins { tier: Tier },

    #[error("State for user '{user_id}' changed underneath the commit")]
    ConcurrentModification { user_id: String },

    #[error("Gave up on user '{user_id}' after {attempts} conflicting commits")]
    TransientFailure { user_id: String, attempts: u32 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WheelError {
    /// Only a lost compare-and-swap is worth a full recompute.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    pub(crate) fn invalid_catalog(reason: impl Into<String>) -> Self {
        Self::InvalidCatalog { reason: reason.into() }
    }
}

pub type WheelResult<T> = Result<T, WheelError>;
