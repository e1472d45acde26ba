//! Feedback records: what happened to each proactive message.
//!
//! A record is created `pending` at send time and transitions exactly once
//! to a terminal outcome based on reply timing, reply sentiment, delivery
//! receipts, or timeout. Records are never reopened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::types::candidate::{Category, Candidate};
use crate::types::sender::MessageFormat;
use crate::types::signal::SignalType;

/// Bounded outcome taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    Pending,
    PositiveReply,
    NeutralReply,
    NegativeReply,
    LateEngage,
    ExplicitStop,
    Ignored,
    Undelivered,
}

impl Outcome {
    /// Fixed outcome-to-score table used by reflection metrics.
    /// `Undelivered` carries no score; `Pending` is not terminal.
    pub fn score(self) -> Option<f64> {
        match self {
            Outcome::PositiveReply => Some(1.0),
            Outcome::NeutralReply => Some(0.5),
            Outcome::LateEngage => Some(0.25),
            Outcome::Ignored => Some(0.0),
            Outcome::NegativeReply => Some(-0.5),
            Outcome::ExplicitStop => Some(-1.0),
            Outcome::Undelivered | Outcome::Pending => None,
        }
    }

    /// Whether the user engaged at all.
    pub fn is_engaged(self) -> bool {
        matches!(
            self,
            Outcome::PositiveReply | Outcome::NeutralReply | Outcome::LateEngage
        )
    }

    /// Whether this is a terminal state.
    pub fn is_terminal(self) -> bool {
        self != Outcome::Pending
    }

    /// Whether the outcome counts against the category.
    pub fn is_negative(self) -> bool {
        matches!(self, Outcome::NegativeReply | Outcome::ExplicitStop)
    }
}

/// Delivery receipt status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Keyword-classified reply sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

/// Per-send feedback record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub user_id: String,
    pub category: Category,
    pub trigger_signals: Vec<SignalType>,
    pub sent_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub delivery_status: DeliveryStatus,
    pub format: MessageFormat,
    /// Whether the candidate was accepted through exploration.
    pub explored: bool,
    pub reply_sentiment: Option<Sentiment>,
    pub feedback_score: Option<f64>,
    pub response_latency_seconds: Option<i64>,
}

impl FeedbackRecord {
    /// Open a pending record at send time.
    pub fn pending(
        user_id: impl Into<String>,
        candidate: &Candidate,
        format: MessageFormat,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            category: candidate.category,
            trigger_signals: candidate.trigger_signals.clone(),
            sent_at,
            outcome: Outcome::Pending,
            delivery_status: DeliveryStatus::Sent,
            format,
            explored: candidate.explored,
            reply_sentiment: None,
            feedback_score: None,
            response_latency_seconds: None,
        }
    }

    /// Close the record with a terminal outcome. Closing an already-closed
    /// record is a no-op; the first transition wins.
    pub fn close(&mut self, outcome: Outcome, replied_at: Option<DateTime<Utc>>) {
        if self.outcome.is_terminal() || !outcome.is_terminal() {
            return;
        }
        self.outcome = outcome;
        self.feedback_score = outcome.score();
        if let Some(at) = replied_at {
            self.response_latency_seconds = Some((at - self.sent_at).num_seconds());
        }
    }
}
