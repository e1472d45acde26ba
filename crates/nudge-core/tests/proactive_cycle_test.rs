//! Integration tests for the proactive decision pipeline.
//!
//! Drives the engine end to end over an in-memory store with mock
//! collectors, a mock candidate source, and a mock delivery channel.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Map;

use nudge_core::types::{RenderedMessage, SignalSource};
use nudge_core::{
    ActionKind, BehaviorKey, Candidate, CandidateContext, CandidateSource, Category, CycleOutcome,
    DeliveryChannel, DeliveryReceipt, EngineConfig, NudgeResult, Outcome, ProactiveEngine,
    ProactiveStore, Signal, SignalCollector, SignalType, SqliteStore, UserProfile,
};

struct StaticCollector {
    signals: Vec<Signal>,
}

#[async_trait]
impl SignalCollector for StaticCollector {
    fn name(&self) -> &str {
        "static"
    }

    async fn collect(&self, user_id: &str) -> Vec<Signal> {
        self.signals
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }
}

struct StaticSource {
    candidates: Vec<Candidate>,
}

#[async_trait]
impl CandidateSource for StaticSource {
    async fn generate(&self, _context: &CandidateContext) -> NudgeResult<Vec<Candidate>> {
        Ok(self.candidates.clone())
    }
}

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<RenderedMessage>>,
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(&self, _to: &str, message: &RenderedMessage) -> NudgeResult<DeliveryReceipt> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(DeliveryReceipt::delivered())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn established_profile(user_id: &str) -> UserProfile {
    let mut profile = UserProfile::new(user_id);
    profile.created_at = Utc::now() - Duration::days(120);
    profile.message_count = 500;
    profile.last_active_at = Some(Utc::now());
    profile.onboarded = true;
    // Degenerate sleep window: the engine is always awake in tests.
    profile.wake_hour = 0;
    profile.sleep_hour = 0;
    profile
}

fn deadline_signal(user_id: &str) -> Signal {
    let mut data = Map::new();
    data.insert("title".to_string(), serde_json::json!("Essay Draft"));
    data.insert("date".to_string(), serde_json::json!("2026-08-10"));
    Signal::new(
        SignalType::ApproachingDeadline,
        user_id,
        data,
        SignalSource::Coursework,
    )
}

fn reminder_candidate(message: &str, score: f64) -> Candidate {
    Candidate {
        message: message.to_string(),
        relevance: score,
        timing: score,
        urgency: score,
        category: Category::TaskReminder,
        trigger_signals: vec![SignalType::ApproachingDeadline],
        action_type: ActionKind::Text,
        link: None,
        explored: false,
    }
}

fn engine(
    store: Arc<SqliteStore>,
    signals: Vec<Signal>,
    candidates: Vec<Candidate>,
    channel: Arc<RecordingChannel>,
) -> ProactiveEngine {
    ProactiveEngine::new(
        EngineConfig::default(),
        store,
        vec![Arc::new(StaticCollector { signals })],
        Arc::new(StaticSource { candidates }),
        channel,
    )
}

/// Full happy path: signal in, message out, reply closes the feedback loop,
/// reflection learns from it.
#[tokio::test]
async fn test_send_reply_reflect_round_trip() {
    init_tracing();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store.upsert_profile(&established_profile("user-1")).unwrap();
    let channel = Arc::new(RecordingChannel::default());

    let engine = engine(
        store.clone(),
        vec![deadline_signal("user-1")],
        vec![reminder_candidate("Your essay draft is due Monday.", 8.0)],
        channel.clone(),
    );

    // Cycle sends exactly one message.
    let outcome = engine.run_user_cycle("user-1").await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Sent { .. }));
    assert_eq!(channel.sent.lock().unwrap().len(), 1);

    // The user replies positively; the pending record closes.
    let outcomes = engine
        .on_user_message("user-1", "thanks, I'll get on it!")
        .await
        .unwrap();
    assert_eq!(outcomes, vec![Outcome::PositiveReply]);

    // Reflection turns history into behaviors.
    let report = engine.run_reflection().await.unwrap();
    assert_eq!(report.users_processed, 1);
    assert!(report.errors.is_empty());
    assert!(store
        .get_behavior("user-1", BehaviorKey::ActiveHours)
        .unwrap()
        .is_some());
}

/// The cooldown gate keeps a second cycle quiet even with fresh signals.
#[tokio::test]
async fn test_second_cycle_hits_cooldown() {
    init_tracing();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store.upsert_profile(&established_profile("user-1")).unwrap();
    let channel = Arc::new(RecordingChannel::default());

    let engine = engine(
        store.clone(),
        vec![deadline_signal("user-1")],
        vec![reminder_candidate("Your essay draft is due Monday.", 8.0)],
        channel.clone(),
    );

    let first = engine.run_user_cycle("user-1").await.unwrap();
    assert!(matches!(first, CycleOutcome::Sent { .. }));

    // The same deadline is re-collected but its state says "just seen", so
    // dedup swallows it; the cycle blocks on no signals. Use a different
    // signal to prove the cooldown specifically.
    let mut data = Map::new();
    data.insert("id".to_string(), serde_json::json!("task-77"));
    let fresh = Signal::new(
        SignalType::OverdueTask,
        "user-1",
        data,
        SignalSource::Internal,
    ).with_urgency(6);

    let engine2 = engine_with_signal(store, fresh, channel.clone());
    let second = engine2.run_user_cycle("user-1").await.unwrap();
    assert_eq!(
        second,
        CycleOutcome::Blocked(nudge_core::BlockReason::Cooldown)
    );
    assert_eq!(channel.sent.lock().unwrap().len(), 1);
}

fn engine_with_signal(
    store: Arc<SqliteStore>,
    signal: Signal,
    channel: Arc<RecordingChannel>,
) -> ProactiveEngine {
    engine(
        store,
        vec![signal],
        vec![reminder_candidate("Overdue: problem set 4.", 8.0)],
        channel,
    )
}

/// An explicit stop suppresses the category; later high scorers in that
/// category never go out.
#[tokio::test]
async fn test_explicit_stop_suppresses_future_sends() {
    init_tracing();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store.upsert_profile(&established_profile("user-1")).unwrap();
    let channel = Arc::new(RecordingChannel::default());

    let mut wellbeing = reminder_candidate("How are you feeling today?", 9.0);
    wellbeing.category = Category::Wellbeing;

    let engine = engine(
        store.clone(),
        vec![deadline_signal("user-1")],
        vec![wellbeing],
        channel.clone(),
    );

    let outcome = engine.run_user_cycle("user-1").await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Sent { .. }));

    engine
        .on_user_message("user-1", "stop sending these please")
        .await
        .unwrap();

    // A fresh wellbeing signal arrives later; the candidate scores 9/9/9
    // but its category is now suppressed. Cooldown is disabled so the gate
    // under test is suppression alone.
    let mut data = Map::new();
    data.insert("id".to_string(), serde_json::json!("mood-2"));
    let fresh = Signal::new(
        SignalType::LowMood,
        "user-1",
        data,
        SignalSource::Internal,
    )
    .with_urgency(8);

    let mut wellbeing = reminder_candidate("Checking in on you!", 9.0);
    wellbeing.category = Category::Wellbeing;
    let engine2 = ProactiveEngine::new(
        EngineConfig::builder().cooldown_minutes(0).build(),
        store.clone(),
        vec![Arc::new(StaticCollector {
            signals: vec![fresh],
        })],
        Arc::new(StaticSource {
            candidates: vec![wellbeing],
        }),
        channel.clone(),
    );

    let outcome = engine2.run_user_cycle("user-1").await.unwrap();
    assert_eq!(outcome, CycleOutcome::NoCandidates);
    assert_eq!(channel.sent.lock().unwrap().len(), 1);
}

/// A one-user failure in the fan-out never blocks the other users.
#[tokio::test]
async fn test_loop_tick_processes_all_users() {
    init_tracing();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store.upsert_profile(&established_profile("user-a")).unwrap();
    store.upsert_profile(&established_profile("user-b")).unwrap();
    store.upsert_profile(&established_profile("user-c")).unwrap();
    let channel = Arc::new(RecordingChannel::default());

    // Only user-b has a signal.
    let engine = engine(
        store,
        vec![deadline_signal("user-b")],
        vec![reminder_candidate("Due soon.", 8.0)],
        channel.clone(),
    );

    let report = engine.run_loop_tick().await.unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(report.sent, 1);
    assert_eq!(report.blocked, 2);
    assert!(report.errors.is_empty());
}
