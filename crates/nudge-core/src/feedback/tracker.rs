//! Classifies user replies and delivery receipts into terminal outcomes.
//!
//! Each pending record transitions exactly once. A reply inside the
//! engagement window closes by sentiment; between the window and the hard
//! timeout it counts as late engagement (negative sentiment still wins);
//! past the timeout the sweep closes it as ignored, or undelivered when the
//! channel already reported failure.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::error::NudgeResult;
use crate::feedback::meta::MetaFeedbackDetector;
use crate::store::ProactiveStore;
use crate::types::{
    BehaviorKey, Category, CategorySuppression, DeliveryStatus, Outcome, Sentiment,
    SuppressionEntry, SuppressionReason, UserBehavior,
};

/// Default engagement window when no adaptive value has been learned yet.
pub const DEFAULT_ENGAGEMENT_WINDOW_MINUTES: i64 = 60;
/// Hard timeout after which a pending record is closed as ignored.
pub const ENGAGEMENT_TIMEOUT_MINUTES: i64 = 180;

static POSITIVE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(thanks|thank you|great|perfect|awesome|nice|love it|helpful|got it|will do|good idea|sounds good)\b|👍|❤️|🙏",
    )
    .unwrap()
});

static NEGATIVE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(annoying|not helpful|no thanks|unsubscribe|leave me alone|too many|don't need|go away|stop (sending|messaging|it|this|these)|(please|just) stop)\b",
    )
    .unwrap()
});

static STOP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bstop (sending|messaging|texting|it|this|these)\b|\b(please|just) stop\b|^\s*stop[.!]?\s*$|\bunsubscribe\b|\bleave me alone\b|\bdon'?t message me\b",
    )
    .unwrap()
});

/// Classify reply text by keyword patterns.
pub fn classify_sentiment(text: &str) -> Sentiment {
    // Negative patterns take precedence: "thanks but stop" is a stop.
    if NEGATIVE_PATTERN.is_match(text) {
        Sentiment::Negative
    } else if POSITIVE_PATTERN.is_match(text) {
        Sentiment::Positive
    } else {
        Sentiment::Neutral
    }
}

/// Whether the reply is an explicit request to stop.
pub fn is_explicit_stop(text: &str) -> bool {
    STOP_PATTERN.is_match(text)
}

/// The feedback classification engine.
pub struct FeedbackTracker {
    store: Arc<dyn ProactiveStore>,
    meta: MetaFeedbackDetector,
}

impl FeedbackTracker {
    pub fn new(store: Arc<dyn ProactiveStore>) -> Self {
        Self {
            store,
            meta: MetaFeedbackDetector::new(),
        }
    }

    /// Handle a user-originated message: close pending records it answers
    /// and apply any meta-feedback it carries.
    pub fn on_user_message(
        &self,
        user_id: &str,
        text: &str,
        at: DateTime<Utc>,
    ) -> NudgeResult<Vec<Outcome>> {
        let sentiment = classify_sentiment(text);
        let explicit_stop = is_explicit_stop(text);
        let window = self.engagement_window(user_id)?;
        let timeout = Duration::minutes(ENGAGEMENT_TIMEOUT_MINUTES);

        let mut outcomes = Vec::new();
        for mut record in self.store.pending_feedback(user_id)? {
            let age = at - record.sent_at;
            if age > timeout {
                // The sweep owns anything this old.
                continue;
            }

            let outcome = if age <= window {
                match sentiment {
                    Sentiment::Positive => Outcome::PositiveReply,
                    Sentiment::Neutral => Outcome::NeutralReply,
                    Sentiment::Negative => {
                        if explicit_stop {
                            Outcome::ExplicitStop
                        } else {
                            Outcome::NegativeReply
                        }
                    }
                }
            } else {
                // Late, but negative sentiment still counts as negative.
                match sentiment {
                    Sentiment::Negative => {
                        if explicit_stop {
                            Outcome::ExplicitStop
                        } else {
                            Outcome::NegativeReply
                        }
                    }
                    _ => Outcome::LateEngage,
                }
            };

            record.reply_sentiment = Some(sentiment);
            record.close(outcome, Some(at));
            self.store.update_feedback(&record)?;
            debug!(user_id, outcome = %outcome, "feedback record closed");

            if outcome == Outcome::ExplicitStop {
                self.suppress_category(user_id, record.category)?;
            }
            outcomes.push(outcome);
        }

        // Free-text meta-feedback takes effect immediately, ahead of the
        // next nightly reflection.
        self.meta.apply(self.store.as_ref(), user_id, text)?;

        Ok(outcomes)
    }

    /// Record a failed delivery receipt against the newest pending record.
    pub fn on_delivery_failed(&self, user_id: &str, reason: &str) -> NudgeResult<()> {
        if let Some(mut record) = self.store.pending_feedback(user_id)?.pop() {
            record.delivery_status = DeliveryStatus::Failed;
            record.close(Outcome::Undelivered, None);
            self.store.update_feedback(&record)?;
            info!(user_id, reason, "send marked undelivered");
        }
        Ok(())
    }

    /// Close pending records that aged past the hard timeout.
    pub fn close_expired(&self, now: DateTime<Utc>) -> NudgeResult<usize> {
        let timeout = Duration::minutes(ENGAGEMENT_TIMEOUT_MINUTES);
        let mut closed = 0;
        for mut record in self.store.all_pending_feedback()? {
            if now - record.sent_at <= timeout {
                continue;
            }
            let outcome = if record.delivery_status == DeliveryStatus::Failed {
                Outcome::Undelivered
            } else {
                Outcome::Ignored
            };
            record.close(outcome, None);
            self.store.update_feedback(&record)?;
            closed += 1;
        }
        Ok(closed)
    }

    /// Permanently suppress a category after an explicit stop.
    fn suppress_category(&self, user_id: &str, category: Category) -> NudgeResult<()> {
        let mut suppression: CategorySuppression = self
            .store
            .get_behavior(user_id, BehaviorKey::CategorySuppression)?
            .and_then(|b| serde_json::from_value(b.value).ok())
            .unwrap_or_default();

        match suppression
            .suppressed
            .iter_mut()
            .find(|e| e.category == category)
        {
            Some(entry) => {
                // An explicit stop upgrades any probationary entry.
                entry.reason = SuppressionReason::ExplicitStop;
                entry.probation_until = None;
            }
            None => suppression.suppressed.push(SuppressionEntry {
                category,
                reason: SuppressionReason::ExplicitStop,
                since: Utc::now(),
                probation_until: None,
            }),
        }

        info!(user_id, category = %category, "category suppressed on explicit stop");
        self.store.put_behavior(&UserBehavior::explicit(
            user_id,
            BehaviorKey::CategorySuppression,
            serde_json::to_value(&suppression)?,
        ))
    }

    fn engagement_window(&self, user_id: &str) -> NudgeResult<Duration> {
        let minutes = self
            .store
            .get_behavior(user_id, BehaviorKey::EngagementWindow)?
            .and_then(|b| b.value.get("minutes").and_then(|v| v.as_i64()))
            .unwrap_or(DEFAULT_ENGAGEMENT_WINDOW_MINUTES);
        Ok(Duration::minutes(minutes))
    }
}
