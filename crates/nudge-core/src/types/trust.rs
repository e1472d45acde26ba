//! Trust tiers: how often and how boldly the engine may initiate contact.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Proactivity tier derived from account tenure and engagement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrustLevel {
    New,
    Building,
    Established,
    Deep,
}

impl TrustLevel {
    /// Step down one tier, flooring at `New`.
    pub fn demote(self) -> Self {
        match self {
            TrustLevel::Deep => TrustLevel::Established,
            TrustLevel::Established => TrustLevel::Building,
            TrustLevel::Building | TrustLevel::New => TrustLevel::New,
        }
    }

    /// Minimum composite score a candidate needs at this tier.
    pub fn score_threshold(self) -> f64 {
        match self {
            TrustLevel::New => 7.0,
            TrustLevel::Building => 6.0,
            TrustLevel::Established => 5.5,
            TrustLevel::Deep => 5.0,
        }
    }

    /// Maximum proactive sends per local calendar day.
    pub fn daily_cap(self) -> u32 {
        match self {
            TrustLevel::New => 2,
            TrustLevel::Building => 3,
            TrustLevel::Established => 4,
            TrustLevel::Deep => 5,
        }
    }

    /// Minimum signal urgency worth waking the pipeline for.
    pub fn min_urgency(self) -> u8 {
        match self {
            TrustLevel::New => 7,
            TrustLevel::Building => 6,
            TrustLevel::Established => 5,
            TrustLevel::Deep => 4,
        }
    }
}

/// Trust computed for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustInfo {
    pub level: TrustLevel,
    pub days_active: i64,
    pub total_interactions: u64,
    pub score_threshold: f64,
    pub daily_cap: u32,
    pub min_urgency: u8,
}

impl TrustInfo {
    /// Assemble the budget numbers for a level.
    pub fn for_level(level: TrustLevel, days_active: i64, total_interactions: u64) -> Self {
        Self {
            level,
            days_active,
            total_interactions,
            score_threshold: level.score_threshold(),
            daily_cap: level.daily_cap(),
            min_urgency: level.min_urgency(),
        }
    }
}
