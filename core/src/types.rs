//! Shared primitive types used across the engine.

use crate::error::WheelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque user identifier supplied by the caller.
pub type UserId = String;

/// Stable reward definition id from the catalog.
pub type RewardId = String;

/// Unique id of one committed spin. Grants are idempotent on it.
pub type SpinId = uuid::Uuid;

pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// An economy bracket with its own catalog and spin inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Rookie,
    Pro,
    Elite,
    Free,
    Premium,
}

impl Tier {
    pub const ALL: [Tier; 5] = [Tier::Rookie, Tier::Pro, Tier::Elite, Tier::Free, Tier::Premium];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rookie  => "rookie",
            Self::Pro     => "pro",
            Self::Elite   => "elite",
            Self::Free    => "free",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = WheelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| WheelError::UnknownTier { tier: s.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("Rookie".parse::<Tier>().unwrap(), Tier::Rookie);
        assert_eq!(" elite ".parse::<Tier>().unwrap(), Tier::Elite);
    }

    #[test]
    fn unknown_tier_string_is_rejected() {
        let err = "diamond".parse::<Tier>().unwrap_err();
        assert!(matches!(err, WheelError::UnknownTier { ref tier } if tier == "diamond"));
    }
}
