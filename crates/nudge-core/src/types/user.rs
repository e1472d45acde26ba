//! User profile and stored facts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user account state the pipeline reads every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    /// IANA timezone name, e.g. "Europe/Berlin". `None` means UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Local hour the user's day starts.
    pub wake_hour: u8,
    /// Local hour the user's day ends.
    pub sleep_hour: u8,
    /// Lifetime count of user-originated messages.
    pub message_count: u64,
    /// Last time the user wrote anything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<DateTime<Utc>>,
    /// Only onboarded users enter the proactive loop.
    pub onboarded: bool,
}

impl UserProfile {
    /// A fresh profile with the default 7-23 waking window.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            created_at: Utc::now(),
            timezone: None,
            wake_hour: 7,
            sleep_hour: 23,
            message_count: 0,
            last_active_at: None,
            onboarded: false,
        }
    }

    /// Whole days since account creation.
    pub fn days_active(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }

    /// Whole days since the user last wrote, if ever.
    pub fn days_inactive(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_active_at.map(|at| (now - at).num_days())
    }
}

/// An extracted fact about the user, subject to decay and pruning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFact {
    pub id: Uuid,
    pub user_id: String,
    pub content: String,
    /// Normalized entity name this fact is about, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub last_referenced: DateTime<Utc>,
}

impl UserFact {
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            content: content.into(),
            entity: None,
            confidence: 1.0,
            created_at: now,
            last_referenced: now,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_days_active() {
        let mut profile = UserProfile::new("user-1");
        profile.created_at = Utc::now() - Duration::days(14);
        assert_eq!(profile.days_active(Utc::now()), 14);
    }

    #[test]
    fn test_days_inactive_none_without_activity() {
        let profile = UserProfile::new("user-1");
        assert!(profile.days_inactive(Utc::now()).is_none());
    }

    #[test]
    fn test_fact_builder() {
        let fact = UserFact::new("user-1", "sister's name is Lena").with_entity("lena");
        assert_eq!(fact.entity.as_deref(), Some("lena"));
        assert_eq!(fact.confidence, 1.0);
    }
}
