//! Candidate message types.
//!
//! A candidate is a scored, categorized message proposal produced by the
//! candidate source in response to the current signal batch. Candidates are
//! ephemeral within one cycle; borderline scorers persist as deferred
//! insights and quiet-hours winners persist as deferred sends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::types::signal::SignalType;

/// Composite score weights. The blend is fixed by contract with the
/// candidate source: relevance dominates, timing close behind, urgency last.
pub const WEIGHT_RELEVANCE: f64 = 0.4;
pub const WEIGHT_TIMING: f64 = 0.35;
pub const WEIGHT_URGENCY: f64 = 0.25;

/// Shared category taxonomy.
///
/// Both ends of the candidate-source, scorer, and feedback interfaces key
/// suppression and scoring off this closed set.
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
pub enum Category {
    DeadlineWarning,
    ScheduleInfo,
    TaskReminder,
    Wellbeing,
    Social,
    Nudge,
    Briefing,
    MemoryRecall,
    GradeAlert,
    EmailAlert,
    Habit,
}

/// How the message invites interaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    #[default]
    Text,
    ButtonPrompt,
}

/// A scored message proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Message text to deliver.
    pub message: String,
    /// How relevant the content is right now (1-10).
    pub relevance: f64,
    /// How good the timing is (1-10).
    pub timing: f64,
    /// Urgency (1-10).
    pub urgency: f64,
    /// Category within the shared taxonomy.
    pub category: Category,
    /// Signal types that triggered this proposal.
    #[serde(default)]
    pub trigger_signals: Vec<SignalType>,
    /// Interaction shape.
    #[serde(default)]
    pub action_type: ActionKind,
    /// Optional link payload for call-to-action delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Set when the candidate passed through exploration rather than the
    /// normal threshold, so reflection can weight the outcome accordingly.
    #[serde(default, rename = "_explored", skip_serializing_if = "std::ops::Not::not")]
    pub explored: bool,
}

impl Candidate {
    /// Composite score: `0.4*relevance + 0.35*timing + 0.25*urgency`.
    pub fn composite_score(&self) -> f64 {
        WEIGHT_RELEVANCE * self.relevance + WEIGHT_TIMING * self.timing + WEIGHT_URGENCY * self.urgency
    }
}

/// A borderline candidate retained for later reactive or scheduled use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredInsight {
    pub id: Uuid,
    pub user_id: String,
    pub candidate: Candidate,
    pub created_at: DateTime<Utc>,
    pub consumed: bool,
}

impl DeferredInsight {
    pub fn new(user_id: impl Into<String>, candidate: Candidate) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            candidate,
            created_at: Utc::now(),
            consumed: false,
        }
    }
}

/// Status of a deferred send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeferredStatus {
    Queued,
    Sent,
    Expired,
}

/// A top-scoring candidate blocked by quiet hours, queued for the wake hour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredSend {
    pub id: Uuid,
    pub user_id: String,
    pub message: String,
    pub category: Category,
    pub action_type: ActionKind,
    pub score: f64,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Earliest delivery time (the user's next wake hour).
    pub deliver_after: DateTime<Utc>,
    /// Hard deadline after which the content is meaningless.
    pub deadline: Option<DateTime<Utc>>,
    pub status: DeferredStatus,
}

impl DeferredSend {
    /// Queue a candidate for delivery after `deliver_after`.
    pub fn queue(
        user_id: impl Into<String>,
        candidate: &Candidate,
        deliver_after: DateTime<Utc>,
        deadline: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            message: candidate.message.clone(),
            category: candidate.category,
            action_type: candidate.action_type,
            score: candidate.composite_score(),
            link: candidate.link.clone(),
            created_at: Utc::now(),
            deliver_after,
            deadline,
            status: DeferredStatus::Queued,
        }
    }

    /// Whether this send has aged out or outlived its deadline.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        if let Some(deadline) = self.deadline {
            if now > deadline {
                return true;
            }
        }
        now - self.created_at > max_age
    }

    /// Whether this send is due for delivery.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == DeferredStatus::Queued && now >= self.deliver_after
    }
}
