//! Signal types for the proactive pipeline.
//!
//! A signal is a typed, timestamped observation about a user's context
//! (an approaching deadline, a free-time gap, a posted grade). Every signal
//! carries a deterministic dedup key and a default urgency derived from its
//! type; both are computed once and never change afterwards.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString};

/// Closed set of signal types the pipeline understands.
///
/// Adding a type is a compile-time-checked change: urgency tier, re-emit
/// interval, and dedup behavior all dispatch exhaustively on this enum.
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
pub enum SignalType {
    /// A calendar event starts soon.
    ApproachingEvent,
    /// A coursework deadline is near.
    ApproachingDeadline,
    /// An unscheduled block of time was detected in today's calendar.
    FreeTimeGap,
    /// A new grade was posted.
    GradePosted,
    /// A tracked habit has not been logged and its usual window is closing.
    HabitAtRisk,
    /// A tracked habit hit a streak milestone.
    HabitMilestone,
    /// Recent mood check-ins trend low.
    LowMood,
    /// Today's calendar is unusually dense.
    BusyDay,
    /// The user's morning window opened.
    MorningWindow,
    /// The user's evening window opened.
    EveningWindow,
    /// A noteworthy email arrived.
    EmailReceived,
    /// A task is past its due date.
    OverdueTask,
}

impl SignalType {
    /// Default urgency for this type on the shared 1-10 scale.
    ///
    /// High tier is 8, medium 5, low 3. Callers may override per signal but
    /// the tier is the baseline every collector starts from.
    pub fn default_urgency(&self) -> u8 {
        match self {
            SignalType::ApproachingEvent | SignalType::ApproachingDeadline => 8,
            SignalType::GradePosted
            | SignalType::HabitAtRisk
            | SignalType::LowMood
            | SignalType::EmailReceived
            | SignalType::OverdueTask => 5,
            SignalType::FreeTimeGap
            | SignalType::HabitMilestone
            | SignalType::BusyDay
            | SignalType::MorningWindow
            | SignalType::EveningWindow => 3,
        }
    }

    /// Minimum interval before an identical signal may be emitted again.
    ///
    /// Durable conditions (an unmet deadline) resurface on this cadence
    /// instead of flooding every tick.
    pub fn reemit_interval(&self) -> Duration {
        match self {
            SignalType::ApproachingEvent | SignalType::ApproachingDeadline => Duration::hours(1),
            SignalType::GradePosted | SignalType::HabitMilestone => Duration::hours(168),
            _ => Duration::hours(12),
        }
    }

    /// Types whose instances are identified by the day, not by payload.
    pub fn is_daily(&self) -> bool {
        matches!(
            self,
            SignalType::LowMood
                | SignalType::BusyDay
                | SignalType::MorningWindow
                | SignalType::EveningWindow
        )
    }
}

/// Where a signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SignalSource {
    Calendar,
    Coursework,
    Email,
    Internal,
}

/// A structured observation about a user's context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Signal type.
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    /// Owning user.
    pub user_id: String,
    /// Type-specific payload.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// When the observation was made.
    pub timestamp: DateTime<Utc>,
    /// Originating collector domain.
    pub source: SignalSource,
    /// Deterministic identity used for re-emit suppression.
    pub dedup_key: String,
    /// Urgency on the 1-10 scale.
    pub urgency: u8,
}

impl Signal {
    /// Create a signal, deriving dedup key and urgency from the type.
    pub fn new(
        signal_type: SignalType,
        user_id: impl Into<String>,
        data: Map<String, Value>,
        source: SignalSource,
    ) -> Self {
        let dedup_key = derive_dedup_key(signal_type, &data);
        Self {
            signal_type,
            user_id: user_id.into(),
            urgency: signal_type.default_urgency(),
            timestamp: Utc::now(),
            source,
            dedup_key,
            data,
        }
    }

    /// Builder method to override the default urgency.
    pub fn with_urgency(mut self, urgency: u8) -> Self {
        self.urgency = urgency.clamp(1, 10);
        self
    }

    /// Builder method to pin the observation timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Fetch a string field from the payload.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Fetch a numeric field from the payload.
    pub fn data_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(Value::as_f64)
    }

    /// Attach an annotation produced by enrichment.
    pub fn annotate(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }
}

/// Derive the deterministic dedup key for a signal.
///
/// Precedence: an external id carried in the payload, then a title+date or
/// habit-name pair, then `{type}:daily` for day-scoped types, then the bare
/// type name. Recomputation over the same inputs is idempotent.
pub fn derive_dedup_key(signal_type: SignalType, data: &Map<String, Value>) -> String {
    const ID_FIELDS: [&str; 4] = ["id", "event_id", "assignment_id", "email_id"];

    for field in ID_FIELDS {
        if let Some(id) = data.get(field).and_then(Value::as_str) {
            if !id.is_empty() {
                return format!("{}:{}", signal_type, id);
            }
        }
    }

    if let Some(title) = data.get("title").and_then(Value::as_str) {
        let date = data.get("date").and_then(Value::as_str).unwrap_or("");
        return format!("{}:{}:{}", signal_type, title.to_lowercase(), date);
    }

    if let Some(habit) = data.get("habit").and_then(Value::as_str) {
        return format!("{}:{}", signal_type, habit.to_lowercase());
    }

    if signal_type.is_daily() {
        return format!("{}:daily", signal_type);
    }

    signal_type.to_string()
}

/// Persisted per-(user, dedup key) sighting state.
///
/// Created on first sighting and updated on every subsequent one, whether or
/// not the signal was re-emitted. Rows are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalState {
    pub user_id: String,
    pub dedup_key: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub times_seen: u32,
}

impl SignalState {
    /// State for a first sighting.
    pub fn first(user_id: impl Into<String>, dedup_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            dedup_key: dedup_key.into(),
            first_seen: now,
            last_seen: now,
            times_seen: 1,
        }
    }

    /// Record another sighting.
    pub fn sighted(&mut self, now: DateTime<Utc>) {
        self.last_seen = now;
        self.times_seen += 1;
    }
}
