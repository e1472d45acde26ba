//! Persistence for the proactive pipeline.
//!
//! Point-read/point-write with last-write-wins; no richer semantics. The
//! loop relies on re-fetching mutable rows immediately before updating them
//! rather than on cross-cycle locks.

pub mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::NudgeResult;
use crate::types::{
    BehaviorKey, DeferredInsight, DeferredSend, DeferredStatus, FeedbackRecord, SignalState,
    StoredMessage, UserBehavior, UserFact, UserProfile,
};

/// Storage operations the pipeline needs.
pub trait ProactiveStore: Send + Sync {
    // Profiles

    /// Insert or replace a user profile.
    fn upsert_profile(&self, profile: &UserProfile) -> NudgeResult<()>;

    /// Fetch a profile.
    fn get_profile(&self, user_id: &str) -> NudgeResult<Option<UserProfile>>;

    /// Ids of all onboarded users, in stable order.
    fn onboarded_users(&self) -> NudgeResult<Vec<String>>;

    // Signal state

    /// Batch-load sighting state for a user's dedup keys.
    fn get_signal_states(&self, user_id: &str, keys: &[String]) -> NudgeResult<Vec<SignalState>>;

    /// Insert or replace one sighting state row.
    fn upsert_signal_state(&self, state: &SignalState) -> NudgeResult<()>;

    // Feedback

    /// Insert a new feedback record.
    fn insert_feedback(&self, record: &FeedbackRecord) -> NudgeResult<()>;

    /// Replace an existing feedback record.
    fn update_feedback(&self, record: &FeedbackRecord) -> NudgeResult<()>;

    /// All records still pending for a user.
    fn pending_feedback(&self, user_id: &str) -> NudgeResult<Vec<FeedbackRecord>>;

    /// All records pending across users (for the timeout sweep).
    fn all_pending_feedback(&self) -> NudgeResult<Vec<FeedbackRecord>>;

    /// Records sent since a point in time.
    fn feedback_since(&self, user_id: &str, since: DateTime<Utc>)
        -> NudgeResult<Vec<FeedbackRecord>>;

    /// Count of proactive sends since a point in time (the local day start).
    fn sends_since(&self, user_id: &str, since: DateTime<Utc>) -> NudgeResult<u32>;

    /// Timestamp of the most recent proactive send.
    fn last_sent_at(&self, user_id: &str) -> NudgeResult<Option<DateTime<Utc>>>;

    // Behaviors

    /// Insert or replace a behavior row.
    fn put_behavior(&self, behavior: &UserBehavior) -> NudgeResult<()>;

    /// Fetch one behavior row.
    fn get_behavior(&self, user_id: &str, key: BehaviorKey) -> NudgeResult<Option<UserBehavior>>;

    // Deferred sends / insights

    /// Queue a deferred send.
    fn queue_deferred_send(&self, send: &DeferredSend) -> NudgeResult<()>;

    /// All still-queued deferred sends.
    fn queued_deferred_sends(&self) -> NudgeResult<Vec<DeferredSend>>;

    /// Transition a deferred send's status.
    fn mark_deferred_send(&self, id: Uuid, status: DeferredStatus) -> NudgeResult<()>;

    /// Persist a borderline candidate as an insight.
    fn insert_insight(&self, insight: &DeferredInsight) -> NudgeResult<()>;

    /// Return unconsumed insights for a user and mark them consumed.
    fn take_insights(&self, user_id: &str) -> NudgeResult<Vec<DeferredInsight>>;

    // Messages

    /// Append to the conversation log.
    fn log_message(&self, message: &StoredMessage) -> NudgeResult<()>;

    /// Messages created since a point in time, oldest first.
    fn recent_messages(&self, user_id: &str, since: DateTime<Utc>)
        -> NudgeResult<Vec<StoredMessage>>;

    // Facts

    /// Insert a fact.
    fn insert_fact(&self, fact: &UserFact) -> NudgeResult<()>;

    /// All facts for a user.
    fn facts_for(&self, user_id: &str) -> NudgeResult<Vec<UserFact>>;

    /// Replace a fact.
    fn update_fact(&self, fact: &UserFact) -> NudgeResult<()>;

    /// Delete a fact.
    fn delete_fact(&self, id: Uuid) -> NudgeResult<()>;
}
