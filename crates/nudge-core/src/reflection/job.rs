//! The nightly reflection run.
//!
//! One user at a time, independent and failure-isolated: an error while
//! reflecting on one user is recorded and the run moves on. Every
//! statistical behavior is recomputed wholesale from stored history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::NudgeResult;
use crate::reflection::memory::UpkeepResult;
use crate::reflection::{activity, memory, metrics};
use crate::store::ProactiveStore;
use crate::types::{BehaviorKey, CategorySuppression, UserBehavior};

/// Summary of one reflection run.
#[derive(Debug, Clone, Default)]
pub struct ReflectionReport {
    /// Users successfully reflected on.
    pub users_processed: usize,
    /// Behavior rows written.
    pub behaviors_written: usize,
    /// Memory upkeep totals.
    pub upkeep: UpkeepResult,
    /// Per-user errors (non-fatal, processing continued).
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReflectionReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            ..Default::default()
        }
    }

    pub fn complete(mut self, now: DateTime<Utc>) -> Self {
        self.completed_at = Some(now);
        self
    }
}

/// Nightly per-user behavioral-model refresh.
pub struct ReflectionJob {
    store: Arc<dyn ProactiveStore>,
}

impl ReflectionJob {
    pub fn new(store: Arc<dyn ProactiveStore>) -> Self {
        Self { store }
    }

    /// Reflect on every onboarded user.
    pub fn run_all(&self, now: DateTime<Utc>) -> NudgeResult<ReflectionReport> {
        let mut report = ReflectionReport::new(now);
        for user_id in self.store.onboarded_users()? {
            match self.run_for_user(&user_id, now) {
                Ok((written, upkeep)) => {
                    report.users_processed += 1;
                    report.behaviors_written += written;
                    report.upkeep.decayed += upkeep.decayed;
                    report.upkeep.pruned += upkeep.pruned;
                    report.upkeep.merged += upkeep.merged;
                }
                Err(e) => {
                    warn!(user_id, error = %e, "reflection failed for user");
                    report.errors.push(format!("{}: {}", user_id, e));
                }
            }
        }
        info!(
            users = report.users_processed,
            behaviors = report.behaviors_written,
            errors = report.errors.len(),
            "reflection run complete"
        );
        Ok(report.complete(Utc::now()))
    }

    /// Recompute one user's behaviors and run memory upkeep.
    pub fn run_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> NudgeResult<(usize, UpkeepResult)> {
        let messages = self
            .store
            .recent_messages(user_id, activity::window_start(now))?;
        let records = self
            .store
            .feedback_since(user_id, activity::window_start(now))?;

        let mut written = 0;

        // Raw-activity behaviors.
        let (value, samples) = activity::active_hours(&messages);
        self.write(user_id, BehaviorKey::ActiveHours, value, samples, &mut written)?;

        let (value, samples) = activity::message_length(&messages);
        self.write(user_id, BehaviorKey::MessageLength, value, samples, &mut written)?;

        let (value, samples) = activity::response_speed(&messages);
        self.write(user_id, BehaviorKey::ResponseSpeed, value, samples, &mut written)?;

        let (value, samples) = activity::language_register(&messages);
        self.write(
            user_id,
            BehaviorKey::LanguageRegister,
            value,
            samples,
            &mut written,
        )?;

        let (value, samples) = activity::signal_sensitivity(&records);
        self.write(
            user_id,
            BehaviorKey::SignalSensitivity,
            value,
            samples,
            &mut written,
        )?;

        // Feedback-derived metrics.
        let (value, samples) = metrics::category_preferences(&records, now);
        self.write(
            user_id,
            BehaviorKey::CategoryPreferences,
            value,
            samples,
            &mut written,
        )?;

        let (value, samples) = metrics::engagement_trends(&records, now);
        self.write(
            user_id,
            BehaviorKey::EngagementTrends,
            value,
            samples,
            &mut written,
        )?;

        let (value, samples) = metrics::send_hours(&records);
        self.write(user_id, BehaviorKey::SendHours, value, samples, &mut written)?;

        if let Some((value, samples)) = metrics::preferred_format(&records, now) {
            self.write(
                user_id,
                BehaviorKey::PreferredFormat,
                value,
                samples,
                &mut written,
            )?;
        }

        if let Some((value, samples)) = metrics::engagement_window(&records) {
            self.write(
                user_id,
                BehaviorKey::EngagementWindow,
                value,
                samples,
                &mut written,
            )?;
        }

        // Suppression carries existing state forward (permanence, probation).
        let existing: CategorySuppression = self
            .store
            .get_behavior(user_id, BehaviorKey::CategorySuppression)?
            .and_then(|b| serde_json::from_value(b.value).ok())
            .unwrap_or_default();
        let suppression = metrics::category_suppression(existing, &records, now);
        self.store.put_behavior(&UserBehavior::explicit(
            user_id,
            BehaviorKey::CategorySuppression,
            serde_json::to_value(&suppression)?,
        ))?;
        written += 1;

        let upkeep = memory::run_upkeep(self.store.as_ref(), user_id, now)?;

        Ok((written, upkeep))
    }

    fn write(
        &self,
        user_id: &str,
        key: BehaviorKey,
        value: serde_json::Value,
        samples: usize,
        written: &mut usize,
    ) -> NudgeResult<()> {
        self.store
            .put_behavior(&UserBehavior::inferred(user_id, key, value, samples))?;
        *written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{
        ActionKind, Candidate, Category, FeedbackRecord, MessageFormat, Outcome, SignalType,
        StoredMessage, UserProfile,
    };
    use chrono::Duration;

    fn seeded_store() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let mut profile = UserProfile::new("user-1");
        profile.onboarded = true;
        store.upsert_profile(&profile).unwrap();

        for i in 0..5 {
            let mut m = StoredMessage::from_user("user-1", "thanks, looks good");
            m.created_at = Utc::now() - Duration::days(i);
            store.log_message(&m).unwrap();
        }

        let candidate = Candidate {
            message: "m".into(),
            relevance: 7.0,
            timing: 7.0,
            urgency: 7.0,
            category: Category::TaskReminder,
            trigger_signals: vec![SignalType::ApproachingDeadline],
            action_type: ActionKind::Text,
            link: None,
            explored: false,
        };
        for i in 0..4 {
            let sent_at = Utc::now() - Duration::days(i);
            let mut record =
                FeedbackRecord::pending("user-1", &candidate, MessageFormat::Text, sent_at);
            record.close(Outcome::PositiveReply, Some(sent_at + Duration::minutes(12)));
            store.insert_feedback(&record).unwrap();
        }
        store
    }

    #[test]
    fn test_run_writes_behaviors() {
        let store = seeded_store();
        let job = ReflectionJob::new(store.clone());

        let report = job.run_all(Utc::now()).unwrap();
        assert_eq!(report.users_processed, 1);
        assert!(report.errors.is_empty());
        assert!(report.behaviors_written >= 9);

        assert!(store
            .get_behavior("user-1", BehaviorKey::ActiveHours)
            .unwrap()
            .is_some());
        assert!(store
            .get_behavior("user-1", BehaviorKey::CategoryPreferences)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_reflection_is_idempotent() {
        let store = seeded_store();
        let job = ReflectionJob::new(store.clone());
        let now = Utc::now();

        job.run_all(now).unwrap();
        let first: Vec<serde_json::Value> = [
            BehaviorKey::ActiveHours,
            BehaviorKey::MessageLength,
            BehaviorKey::CategoryPreferences,
            BehaviorKey::SignalSensitivity,
        ]
        .iter()
        .map(|k| store.get_behavior("user-1", *k).unwrap().unwrap().value)
        .collect();

        job.run_all(now).unwrap();
        let second: Vec<serde_json::Value> = [
            BehaviorKey::ActiveHours,
            BehaviorKey::MessageLength,
            BehaviorKey::CategoryPreferences,
            BehaviorKey::SignalSensitivity,
        ]
        .iter()
        .map(|k| store.get_behavior("user-1", *k).unwrap().unwrap().value)
        .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_engagement_window_written_from_latency() {
        let store = seeded_store();
        let job = ReflectionJob::new(store.clone());
        job.run_all(Utc::now()).unwrap();

        let behavior = store
            .get_behavior("user-1", BehaviorKey::EngagementWindow)
            .unwrap()
            .unwrap();
        // Median latency 12 minutes: 3x is 36.
        assert_eq!(behavior.value["minutes"], 36);
    }
}
