//! Cheap, deterministic hard gates run before any generation call.
//!
//! Gates run in a fixed order and short-circuit with a named block reason.
//! A signal with raw urgency >= 8 is an urgent override: it bypasses quiet
//! hours, the daily cap, and the cooldown (but weak sibling signals are
//! still dropped by the urgency gate).

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::error::NudgeResult;
use crate::pipeline::trust::TrustModel;
use crate::store::ProactiveStore;
use crate::types::{
    BehaviorKey, Category, CategorySuppression, Signal, SignalType, TrustInfo, UserProfile,
};

/// Raw urgency at or above which a signal overrides the soft gates.
pub const URGENT_OVERRIDE_THRESHOLD: u8 = 8;

/// Urgency penalty for signal types the user has historically ignored.
const SENSITIVITY_PENALTY: u8 = 2;
/// Ignore rate at which the penalty kicks in.
const SENSITIVITY_IGNORE_RATE: f64 = 0.8;
/// Minimum recorded sends before an ignore rate is trusted.
const SENSITIVITY_MIN_SENDS: u64 = 3;

/// Why the prefilter blocked a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BlockReason {
    NoSignals,
    LowUrgency,
    QuietHours,
    DailyCap,
    Cooldown,
}

/// What survives the gates when the cycle may proceed.
#[derive(Debug, Clone)]
pub struct PrefilterPass {
    pub signals: Vec<Signal>,
    pub trust: TrustInfo,
    /// Categories currently suppressed, for downstream hard-filtering.
    pub suppressed: Vec<Category>,
}

/// Prefilter verdict.
#[derive(Debug, Clone)]
pub enum PrefilterOutcome {
    Proceed(PrefilterPass),
    Blocked {
        reason: BlockReason,
        /// Present only for quiet-hours blocks where every later gate
        /// passed: the cycle may still generate once and queue the winner
        /// for this delivery time.
        deferrable: Option<Box<DeferrableBlock>>,
    },
}

/// Context for a generate-and-defer pass during quiet hours.
#[derive(Debug, Clone)]
pub struct DeferrableBlock {
    pub signals: Vec<Signal>,
    pub trust: TrustInfo,
    pub suppressed: Vec<Category>,
    /// The user's next wake time, in UTC.
    pub deliver_after: DateTime<Utc>,
}

/// The ordered hard gate chain.
pub struct Prefilter {
    store: Arc<dyn ProactiveStore>,
    trust_model: TrustModel,
    cooldown: Duration,
}

impl Prefilter {
    pub fn new(store: Arc<dyn ProactiveStore>, cooldown: Duration) -> Self {
        Self {
            store,
            trust_model: TrustModel::new(),
            cooldown,
        }
    }

    /// Run the gates for one user's signal batch.
    pub fn evaluate(
        &self,
        profile: Option<&UserProfile>,
        signals: Vec<Signal>,
        now: DateTime<Utc>,
    ) -> NudgeResult<PrefilterOutcome> {
        // (a) nothing to react to
        if signals.is_empty() {
            return Ok(blocked(BlockReason::NoSignals));
        }

        let user_id = signals[0].user_id.clone();
        let trust = self.trust_model.compute(profile, now);

        // (b) urgency gate with sensitivity penalty
        let penalized = self.penalized_types(&user_id)?;
        let urgent_override = signals
            .iter()
            .any(|s| s.urgency >= URGENT_OVERRIDE_THRESHOLD);
        let signals: Vec<Signal> = signals
            .into_iter()
            .filter(|s| {
                let required = if penalized.contains(&s.signal_type) {
                    trust.min_urgency.saturating_add(SENSITIVITY_PENALTY)
                } else {
                    trust.min_urgency
                };
                s.urgency >= required
            })
            .collect();
        if signals.is_empty() {
            return Ok(blocked(BlockReason::LowUrgency));
        }

        let suppressed = self.suppressed_categories(&user_id)?;

        // (c) quiet hours
        let in_quiet_hours = profile
            .map(|p| is_sleep_hour(p, now))
            .unwrap_or(false);
        if in_quiet_hours && !urgent_override {
            debug!(user_id, "blocked by quiet hours");
            // Evaluate the remaining gates so the cycle knows whether a
            // deferred send is allowed.
            let cap_ok = !self.over_daily_cap(&user_id, profile, &trust, now)?;
            let cooldown_ok = !self.in_cooldown(&user_id, now)?;
            let deferrable = (cap_ok && cooldown_ok).then(|| {
                Box::new(DeferrableBlock {
                    deliver_after: profile
                        .map(|p| next_wake_time(p, now))
                        .unwrap_or(now),
                    signals,
                    trust: trust.clone(),
                    suppressed: suppressed.clone(),
                })
            });
            return Ok(PrefilterOutcome::Blocked {
                reason: BlockReason::QuietHours,
                deferrable,
            });
        }

        // (d) daily cap
        if !urgent_override && self.over_daily_cap(&user_id, profile, &trust, now)? {
            return Ok(blocked(BlockReason::DailyCap));
        }

        // (e) cooldown
        if !urgent_override && self.in_cooldown(&user_id, now)? {
            return Ok(blocked(BlockReason::Cooldown));
        }

        Ok(PrefilterOutcome::Proceed(PrefilterPass {
            signals,
            trust,
            suppressed,
        }))
    }

    fn penalized_types(&self, user_id: &str) -> NudgeResult<Vec<SignalType>> {
        let Some(behavior) = self
            .store
            .get_behavior(user_id, BehaviorKey::SignalSensitivity)?
        else {
            return Ok(Vec::new());
        };

        let mut penalized = Vec::new();
        if let Some(map) = behavior.value.as_object() {
            for (type_name, stats) in map {
                let sends = stats.get("sends").and_then(|v| v.as_u64()).unwrap_or(0);
                let ignore_rate = stats
                    .get("ignore_rate")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                if sends >= SENSITIVITY_MIN_SENDS && ignore_rate >= SENSITIVITY_IGNORE_RATE {
                    if let Ok(signal_type) = SignalType::from_str(type_name) {
                        penalized.push(signal_type);
                    }
                }
            }
        }
        Ok(penalized)
    }

    fn suppressed_categories(&self, user_id: &str) -> NudgeResult<Vec<Category>> {
        let Some(behavior) = self
            .store
            .get_behavior(user_id, BehaviorKey::CategorySuppression)?
        else {
            return Ok(Vec::new());
        };
        let suppression: CategorySuppression =
            serde_json::from_value(behavior.value).unwrap_or_default();
        Ok(suppression.suppressed.iter().map(|e| e.category).collect())
    }

    fn over_daily_cap(
        &self,
        user_id: &str,
        profile: Option<&UserProfile>,
        trust: &TrustInfo,
        now: DateTime<Utc>,
    ) -> NudgeResult<bool> {
        let day_start = profile
            .map(|p| local_day_start(p, now))
            .unwrap_or_else(|| utc_day_start(now));
        Ok(self.store.sends_since(user_id, day_start)? >= trust.daily_cap)
    }

    fn in_cooldown(&self, user_id: &str, now: DateTime<Utc>) -> NudgeResult<bool> {
        Ok(self
            .store
            .last_sent_at(user_id)?
            .is_some_and(|last| now - last < self.cooldown))
    }
}

fn blocked(reason: BlockReason) -> PrefilterOutcome {
    PrefilterOutcome::Blocked {
        reason,
        deferrable: None,
    }
}

/// Resolve the user's timezone, falling back to UTC on absence or a name
/// the tz database does not know.
fn user_tz(profile: &UserProfile) -> Tz {
    profile
        .timezone
        .as_deref()
        .and_then(|name| Tz::from_str(name).ok())
        .unwrap_or(Tz::UTC)
}

/// Whether the user's local hour falls inside the sleep window.
///
/// The window runs [sleep_hour, wake_hour) and may wrap past midnight
/// (sleep 23, wake 7).
pub fn is_sleep_hour(profile: &UserProfile, now: DateTime<Utc>) -> bool {
    let local_hour = now.with_timezone(&user_tz(profile)).hour() as u8;
    let (sleep, wake) = (profile.sleep_hour, profile.wake_hour);
    if sleep == wake {
        return false;
    }
    if sleep < wake {
        local_hour >= sleep && local_hour < wake
    } else {
        local_hour >= sleep || local_hour < wake
    }
}

/// Start of the user's local calendar day, in UTC.
pub fn local_day_start(profile: &UserProfile, now: DateTime<Utc>) -> DateTime<Utc> {
    let tz = user_tz(profile);
    let local = now.with_timezone(&tz);
    tz.with_ymd_and_hms(local.year(), local.month(), local.day(), 0, 0, 0)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| utc_day_start(now))
}

/// The user's next wake time, in UTC.
pub fn next_wake_time(profile: &UserProfile, now: DateTime<Utc>) -> DateTime<Utc> {
    let tz = user_tz(profile);
    let local = now.with_timezone(&tz);
    let today_wake = tz
        .with_ymd_and_hms(
            local.year(),
            local.month(),
            local.day(),
            profile.wake_hour as u32,
            0,
            0,
        )
        .earliest();

    match today_wake {
        Some(wake) if wake.with_timezone(&Utc) > now => wake.with_timezone(&Utc),
        Some(wake) => wake.with_timezone(&Utc) + Duration::days(1),
        None => now + Duration::hours(8),
    }
}

fn utc_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{
        FeedbackRecord, MessageFormat, SignalSource, TrustLevel, UserBehavior,
    };
    use serde_json::{json, Map};

    fn profile_at(wake: u8, sleep: u8) -> UserProfile {
        let mut profile = UserProfile::new("user-1");
        // Long-tenured, active user: Deep tier, min urgency 4.
        profile.created_at = Utc::now() - Duration::days(120);
        profile.message_count = 500;
        profile.last_active_at = Some(Utc::now());
        profile.wake_hour = wake;
        profile.sleep_hour = sleep;
        profile.onboarded = true;
        profile
    }

    fn signal(signal_type: SignalType, urgency: u8) -> Signal {
        Signal::new(signal_type, "user-1", Map::new(), SignalSource::Internal)
            .with_urgency(urgency)
    }

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc::now()
            .with_hour(hour)
            .unwrap()
            .with_minute(30)
            .unwrap()
    }

    fn prefilter(store: Arc<SqliteStore>) -> Prefilter {
        Prefilter::new(store, Duration::minutes(30))
    }

    fn assert_blocked(outcome: PrefilterOutcome, expected: BlockReason) {
        match outcome {
            PrefilterOutcome::Blocked { reason, .. } => assert_eq!(reason, expected),
            PrefilterOutcome::Proceed(_) => panic!("expected block {:?}", expected),
        }
    }

    #[test]
    fn test_empty_batch_blocks() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let outcome = prefilter(store)
            .evaluate(Some(&profile_at(7, 23)), Vec::new(), at_hour(12))
            .unwrap();
        assert_blocked(outcome, BlockReason::NoSignals);
    }

    #[test]
    fn test_low_urgency_blocks() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let profile = profile_at(7, 23);
        let outcome = prefilter(store)
            .evaluate(
                Some(&profile),
                vec![signal(SignalType::BusyDay, 3)],
                at_hour(12),
            )
            .unwrap();
        assert_blocked(outcome, BlockReason::LowUrgency);
    }

    #[test]
    fn test_quiet_hours_blocks_without_override() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let profile = profile_at(7, 23);
        let outcome = prefilter(store)
            .evaluate(
                Some(&profile),
                vec![signal(SignalType::GradePosted, 5)],
                at_hour(2),
            )
            .unwrap();
        match outcome {
            PrefilterOutcome::Blocked { reason, deferrable } => {
                assert_eq!(reason, BlockReason::QuietHours);
                // Later gates pass, so the block is deferrable.
                assert!(deferrable.is_some());
            }
            _ => panic!("expected quiet-hours block"),
        }
    }

    #[test]
    fn test_urgent_override_passes_quiet_hours() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let profile = profile_at(7, 23);
        let outcome = prefilter(store)
            .evaluate(
                Some(&profile),
                vec![signal(SignalType::ApproachingDeadline, 8)],
                at_hour(2),
            )
            .unwrap();
        match outcome {
            PrefilterOutcome::Proceed(pass) => {
                assert_eq!(pass.signals.len(), 1);
                assert_eq!(pass.trust.level, TrustLevel::Deep);
            }
            _ => panic!("urgent signal must pass at night"),
        }
    }

    #[test]
    fn test_daily_cap_blocks() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let profile = profile_at(7, 23);

        // Deep tier cap is 5; record 5 sends today.
        let candidate = crate::types::Candidate {
            message: "m".into(),
            relevance: 7.0,
            timing: 7.0,
            urgency: 7.0,
            category: Category::Nudge,
            trigger_signals: vec![],
            action_type: Default::default(),
            link: None,
            explored: false,
        };
        for _ in 0..5 {
            let mut record =
                FeedbackRecord::pending("user-1", &candidate, MessageFormat::Text, Utc::now());
            // Mid-day sends: inside today's window, outside the cooldown.
            record.sent_at = at_hour(12) - Duration::hours(2);
            store.insert_feedback(&record).unwrap();
        }

        let outcome = prefilter(store)
            .evaluate(
                Some(&profile),
                vec![signal(SignalType::GradePosted, 5)],
                at_hour(12),
            )
            .unwrap();
        assert_blocked(outcome, BlockReason::DailyCap);
    }

    #[test]
    fn test_cooldown_blocks() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let profile = profile_at(7, 23);

        let candidate = crate::types::Candidate {
            message: "m".into(),
            relevance: 7.0,
            timing: 7.0,
            urgency: 7.0,
            category: Category::Nudge,
            trigger_signals: vec![],
            action_type: Default::default(),
            link: None,
            explored: false,
        };
        let mut record =
            FeedbackRecord::pending("user-1", &candidate, MessageFormat::Text, Utc::now());
        record.sent_at = at_hour(12) - Duration::minutes(10);
        store.insert_feedback(&record).unwrap();

        let outcome = prefilter(store)
            .evaluate(
                Some(&profile),
                vec![signal(SignalType::GradePosted, 5)],
                at_hour(12),
            )
            .unwrap();
        assert_blocked(outcome, BlockReason::Cooldown);
    }

    #[test]
    fn test_sensitivity_penalty_raises_bar() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store
            .put_behavior(&UserBehavior::inferred(
                "user-1",
                BehaviorKey::SignalSensitivity,
                json!({"grade_posted": {"sends": 6, "ignore_rate": 0.9}}),
                6,
            ))
            .unwrap();

        let profile = profile_at(7, 23);
        // Deep tier min urgency is 4; penalized types need 6.
        let outcome = prefilter(store.clone())
            .evaluate(
                Some(&profile),
                vec![signal(SignalType::GradePosted, 5)],
                at_hour(12),
            )
            .unwrap();
        assert_blocked(outcome, BlockReason::LowUrgency);

        let outcome = prefilter(store)
            .evaluate(
                Some(&profile),
                vec![signal(SignalType::GradePosted, 6)],
                at_hour(12),
            )
            .unwrap();
        assert!(matches!(outcome, PrefilterOutcome::Proceed(_)));
    }

    #[test]
    fn test_sleep_window_wraps_midnight() {
        let profile = profile_at(7, 23);
        assert!(is_sleep_hour(&profile, at_hour(23)));
        assert!(is_sleep_hour(&profile, at_hour(3)));
        assert!(!is_sleep_hour(&profile, at_hour(7)));
        assert!(!is_sleep_hour(&profile, at_hour(12)));
    }

    #[test]
    fn test_timezone_shifts_sleep_window() {
        let mut profile = profile_at(7, 23);
        profile.timezone = Some("Asia/Tokyo".to_string());

        // 02:30 UTC is 11:30 in Tokyo: daytime there.
        assert!(!is_sleep_hour(&profile, at_hour(2)));
        // 15:30 UTC is 00:30 in Tokyo: asleep.
        assert!(is_sleep_hour(&profile, at_hour(15)));
    }

    #[test]
    fn test_next_wake_time_is_future() {
        let profile = profile_at(7, 23);
        let now = at_hour(2);
        let wake = next_wake_time(&profile, now);
        assert!(wake > now);
        assert_eq!(wake.hour(), 7);
    }
}
