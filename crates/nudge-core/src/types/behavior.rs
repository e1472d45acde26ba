//! Learned per-user behaviors.
//!
//! A behavior row is a keyed blob of derived knowledge about one user,
//! overwritten wholesale by the nightly reflection run. Two families exist:
//! statistically inferred rows whose confidence scales with sample size, and
//! explicit rows written by the meta-feedback path at confidence 1.0
//! (explicit signal outranks statistical inference).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};

/// Sample count at which statistical confidence saturates.
pub const CONFIDENCE_SATURATION_SAMPLES: usize = 20;

/// Closed set of behavior keys.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BehaviorKey {
    /// Hours of day the user is typically active.
    ActiveHours,
    /// Preferred message length bucket.
    MessageLength,
    /// Typical reply latency.
    ResponseSpeed,
    /// Formality / emoji-use heuristics.
    LanguageRegister,
    /// Per-signal-type ignore rates.
    SignalSensitivity,
    /// Recency-weighted per-category preference scores.
    CategoryPreferences,
    /// Week-over-week engagement trend per category.
    EngagementTrends,
    /// Peak and avoid send hours.
    SendHours,
    /// Preferred delivery format.
    PreferredFormat,
    /// Adaptive engagement window in minutes.
    EngagementWindow,
    /// Suppressed categories with reasons and probation windows.
    CategorySuppression,
    /// Explicit category boost from meta-feedback.
    MetaCategoryBoost,
    /// Explicit format preference from meta-feedback.
    MetaFormatPreference,
    /// Explicit time-of-day preference from meta-feedback.
    MetaTimePreference,
}

/// One learned behavior row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBehavior {
    pub user_id: String,
    pub key: BehaviorKey,
    pub value: Value,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub sample_size: usize,
    pub last_computed: DateTime<Utc>,
}

impl UserBehavior {
    /// A statistically inferred behavior; confidence scales linearly with
    /// sample size up to saturation.
    pub fn inferred(
        user_id: impl Into<String>,
        key: BehaviorKey,
        value: Value,
        sample_size: usize,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            key,
            value,
            confidence: confidence_from_samples(sample_size),
            sample_size,
            last_computed: Utc::now(),
        }
    }

    /// An explicit behavior written by the meta-feedback path.
    pub fn explicit(user_id: impl Into<String>, key: BehaviorKey, value: Value) -> Self {
        Self {
            user_id: user_id.into(),
            key,
            value,
            confidence: 1.0,
            sample_size: 1,
            last_computed: Utc::now(),
        }
    }
}

/// Linear confidence ramp: 20 samples gives 1.0.
pub fn confidence_from_samples(sample_size: usize) -> f64 {
    (sample_size as f64 / CONFIDENCE_SATURATION_SAMPLES as f64).min(1.0)
}

/// Why a category is suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SuppressionReason {
    /// The user said to stop. Permanent.
    ExplicitStop,
    /// Sustained non-engagement. Probationary.
    LowEngagement,
    /// Repeated negative replies. Probationary.
    NegativeFeedback,
}

impl SuppressionReason {
    pub fn is_permanent(self) -> bool {
        matches!(self, SuppressionReason::ExplicitStop)
    }
}

/// A single suppressed category entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionEntry {
    pub category: crate::types::candidate::Category,
    pub reason: SuppressionReason,
    pub since: DateTime<Utc>,
    /// End of the current probation window. `None` for permanent entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probation_until: Option<DateTime<Utc>>,
}

/// The value stored under [`BehaviorKey::CategorySuppression`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorySuppression {
    pub suppressed: Vec<SuppressionEntry>,
}

impl CategorySuppression {
    pub fn contains(&self, category: crate::types::candidate::Category) -> bool {
        self.suppressed.iter().any(|e| e.category == category)
    }

    pub fn get(&self, category: crate::types::candidate::Category) -> Option<&SuppressionEntry> {
        self.suppressed.iter().find(|e| e.category == category)
    }
}
