//! Trust model: tier selection plus one-way inactivity de-escalation.

use chrono::{DateTime, Utc};

use crate::types::{TrustInfo, TrustLevel, UserProfile};

/// Days of inactivity that cost one, then two, tiers.
const DEESCALATE_ONE_AFTER_DAYS: i64 = 30;
const DEESCALATE_TWO_AFTER_DAYS: i64 = 60;

/// Derives a user's proactivity tier from tenure and engagement.
#[derive(Debug, Default)]
pub struct TrustModel;

impl TrustModel {
    pub fn new() -> Self {
        Self
    }

    /// Compute trust for this cycle. Missing profile means a brand-new user
    /// with zero history.
    pub fn compute(&self, profile: Option<&UserProfile>, now: DateTime<Utc>) -> TrustInfo {
        let Some(profile) = profile else {
            return TrustInfo::for_level(TrustLevel::New, 0, 0);
        };

        let days_active = profile.days_active(now).max(0);
        let interactions = profile.message_count;

        let mut level = if days_active < 14 || interactions < 20 {
            TrustLevel::New
        } else if days_active < 30 || interactions < 100 {
            TrustLevel::Building
        } else if days_active < 90 {
            TrustLevel::Established
        } else {
            TrustLevel::Deep
        };

        // De-escalation only; a burst of activity never raises the tier
        // within one computation.
        if let Some(inactive) = profile.days_inactive(now) {
            if inactive >= DEESCALATE_TWO_AFTER_DAYS {
                level = level.demote().demote();
            } else if inactive >= DEESCALATE_ONE_AFTER_DAYS {
                level = level.demote();
            }
        }

        TrustInfo::for_level(level, days_active, interactions)
    }
}
