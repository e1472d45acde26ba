//! The proactive engine: per-user cycles fanned out on a fixed interval.
//!
//! Each user's cycle is independent and failure-isolated. All external
//! calls carry bounded timeouts; a timeout abandons only that user's cycle
//! and the next tick retries naturally if the underlying signal persists.
//! A TTL-backed claim map keeps overlapping ticks from double-processing a
//! user.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use futures::future::join_all;
use rand::thread_rng;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::context::build_candidate_context;
use crate::engine::cycle::{CycleOutcome, LoopReport};
use crate::error::{NudgeError, NudgeResult};
use crate::feedback::FeedbackTracker;
use crate::pipeline::prefilter::{is_sleep_hour, PrefilterOutcome, PrefilterPass};
use crate::pipeline::{Deduplicator, Enricher, Prefilter, Rules, Sender};
use crate::reflection::{ReflectionJob, ReflectionReport};
use crate::store::ProactiveStore;
use crate::traits::{CandidateSource, DeliveryChannel, SignalCollector};
use crate::types::{
    Candidate, DeferredInsight, DeferredSend, DeferredStatus, DeliveryStatus, FeedbackRecord,
    MessageRole, Outcome, Signal, StoredMessage,
};
use crate::util::TtlMap;

/// The assembled decision pipeline.
pub struct ProactiveEngine {
    config: EngineConfig,
    store: Arc<dyn ProactiveStore>,
    collectors: Vec<Arc<dyn SignalCollector>>,
    source: Arc<dyn CandidateSource>,
    dedup: Deduplicator,
    enricher: Enricher,
    prefilter: Prefilter,
    rules: Rules,
    sender: Sender,
    tracker: FeedbackTracker,
    reflection: ReflectionJob,
    /// Per-user claims so overlapping ticks skip users mid-cycle.
    claims: TtlMap<String, ()>,
}

impl ProactiveEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ProactiveStore>,
        collectors: Vec<Arc<dyn SignalCollector>>,
        source: Arc<dyn CandidateSource>,
        channel: Arc<dyn DeliveryChannel>,
    ) -> Self {
        let claim_ttl = StdDuration::from_secs(config.loop_interval_secs.max(60) * 2);
        Self {
            dedup: Deduplicator::new(store.clone()),
            enricher: Enricher::new(),
            prefilter: Prefilter::new(store.clone(), Duration::minutes(config.cooldown_minutes)),
            rules: Rules::new(config.rules.clone()),
            sender: Sender::new(channel),
            tracker: FeedbackTracker::new(store.clone()),
            reflection: ReflectionJob::new(store.clone()),
            claims: TtlMap::new(claim_ttl),
            config,
            store,
            collectors,
            source,
        }
    }

    /// One fan-out over all onboarded users.
    pub async fn run_loop_tick(&self) -> NudgeResult<LoopReport> {
        let mut report = LoopReport::new(Utc::now());
        let users = self.store.onboarded_users()?;
        debug!(users = users.len(), "loop tick starting");

        let cycles = users.into_iter().map(|user_id| async move {
            if !self.claims.try_claim(user_id.clone(), ()).await {
                debug!(user_id, "cycle already in flight, skipping");
                return None;
            }
            let outcome = self.run_user_cycle(&user_id).await;
            self.claims.remove(&user_id).await;
            Some((user_id, outcome))
        });

        for result in join_all(cycles).await.into_iter().flatten() {
            let (user_id, outcome) = result;
            match outcome {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    warn!(user_id, error = %e, "user cycle failed");
                    report.errors.push(format!("{}: {}", user_id, e));
                }
            }
        }

        let report = report.complete();
        info!(
            processed = report.processed,
            sent = report.sent,
            deferred = report.deferred,
            errors = report.errors.len(),
            "loop tick complete"
        );
        Ok(report)
    }

    /// One user's full decision cycle. At most one message goes out.
    pub async fn run_user_cycle(&self, user_id: &str) -> NudgeResult<CycleOutcome> {
        let now = Utc::now();
        let profile = self.store.get_profile(user_id)?;

        // Collect from every domain; collectors are isolated and never raise.
        let mut signals: Vec<Signal> = Vec::new();
        for collector in &self.collectors {
            let collected = collector.collect(user_id).await;
            debug!(
                user_id,
                collector = collector.name(),
                count = collected.len(),
                "signals collected"
            );
            signals.extend(collected);
        }

        let mut signals = self.dedup.filter(user_id, signals, now)?;
        self.enricher.enrich(&mut signals);

        let pass = match self.prefilter.evaluate(profile.as_ref(), signals, now)? {
            PrefilterOutcome::Proceed(pass) => pass,
            PrefilterOutcome::Blocked { reason, deferrable } => {
                if let Some(deferrable) = deferrable {
                    let pass = PrefilterPass {
                        signals: deferrable.signals,
                        trust: deferrable.trust,
                        suppressed: deferrable.suppressed,
                    };
                    if self
                        .defer_top_candidate(user_id, &pass, deferrable.deliver_after)
                        .await?
                    {
                        return Ok(CycleOutcome::Deferred);
                    }
                }
                debug!(user_id, reason = %reason, "cycle blocked");
                return Ok(CycleOutcome::Blocked(reason));
            }
        };

        let Some(winner) = self.pick_winner(user_id, &pass).await? else {
            return Ok(CycleOutcome::NoCandidates);
        };

        self.send_and_record(user_id, &winner, now).await
    }

    /// Generate and score, returning the single candidate worth sending.
    async fn pick_winner(
        &self,
        user_id: &str,
        pass: &PrefilterPass,
    ) -> NudgeResult<Option<Candidate>> {
        let context = build_candidate_context(self.store.as_ref(), user_id, pass)?;
        let candidates = tokio::time::timeout(
            StdDuration::from_secs(self.config.generation_timeout_secs),
            self.source.generate(&context),
        )
        .await
        .map_err(|_| NudgeError::timeout("candidate generation timed out"))??;

        if candidates.is_empty() {
            debug!(user_id, "candidate source had nothing to say");
            return Ok(None);
        }

        let window_start = Utc::now() - Duration::hours(self.config.recent_message_window_hours);
        let recent_assistant: Vec<String> = self
            .store
            .recent_messages(user_id, window_start)?
            .into_iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content)
            .collect();

        let verdict = {
            let mut rng = thread_rng();
            self.rules.select(
                candidates,
                &pass.trust,
                &pass.suppressed,
                &recent_assistant,
                &mut rng,
            )
        };

        for insight in &verdict.insights {
            self.store
                .insert_insight(&DeferredInsight::new(user_id, insight.clone()))?;
        }

        Ok(verdict.winner().cloned())
    }

    /// Deliver the winner and open its feedback record.
    async fn send_and_record(
        &self,
        user_id: &str,
        winner: &Candidate,
        now: chrono::DateTime<Utc>,
    ) -> NudgeResult<CycleOutcome> {
        let delivery = tokio::time::timeout(
            StdDuration::from_secs(self.config.delivery_timeout_secs),
            self.sender.deliver(user_id, winner),
        )
        .await
        .map_err(|_| NudgeError::timeout("delivery timed out"))?;

        match delivery {
            Ok(result) => {
                self.store.log_message(&StoredMessage::from_assistant(
                    user_id,
                    result.body.clone(),
                    true,
                ))?;
                self.store.insert_feedback(&FeedbackRecord::pending(
                    user_id,
                    winner,
                    result.format,
                    now,
                ))?;
                info!(user_id, category = %winner.category, format = %result.format, "proactive message sent");
                Ok(CycleOutcome::Sent {
                    category: winner.category,
                    format: result.format,
                })
            }
            Err(NudgeError::Delivery { message, .. }) => {
                let mut record =
                    FeedbackRecord::pending(user_id, winner, Default::default(), now);
                record.delivery_status = DeliveryStatus::Failed;
                record.close(Outcome::Undelivered, None);
                self.store.insert_feedback(&record)?;
                warn!(user_id, reason = %message, "delivery failed, recorded");
                Ok(CycleOutcome::DeliveryFailed)
            }
            Err(e) => Err(e),
        }
    }

    /// Quiet-hours path: generate once and queue the top scorer for the
    /// wake hour. Returns whether anything was queued.
    async fn defer_top_candidate(
        &self,
        user_id: &str,
        pass: &PrefilterPass,
        deliver_after: chrono::DateTime<Utc>,
    ) -> NudgeResult<bool> {
        let Some(winner) = self.pick_winner(user_id, pass).await? else {
            return Ok(false);
        };
        let send = DeferredSend::queue(user_id, &winner, deliver_after, None);
        self.store.queue_deferred_send(&send)?;
        info!(user_id, category = %winner.category, "send deferred past quiet hours");
        Ok(true)
    }

    /// Short-interval sweep: deliver due deferred sends, expire stale ones.
    pub async fn run_deferred_sweep(&self) -> NudgeResult<usize> {
        let now = Utc::now();
        let max_age = Duration::hours(self.config.deferred_max_age_hours);
        let mut delivered = 0;

        for send in self.store.queued_deferred_sends()? {
            if send.is_stale(now, max_age) {
                self.store
                    .mark_deferred_send(send.id, DeferredStatus::Expired)?;
                debug!(user_id = %send.user_id, "deferred send expired");
                continue;
            }
            if !send.is_due(now) {
                continue;
            }
            // The user may have shifted their schedule since queueing.
            if let Some(profile) = self.store.get_profile(&send.user_id)? {
                if is_sleep_hour(&profile, now) {
                    continue;
                }
            }

            let candidate = Candidate {
                message: send.message.clone(),
                relevance: send.score,
                timing: send.score,
                urgency: send.score,
                category: send.category,
                trigger_signals: Vec::new(),
                action_type: send.action_type,
                link: send.link.clone(),
                explored: false,
            };

            match self.send_and_record(&send.user_id, &candidate, now).await {
                Ok(CycleOutcome::Sent { .. }) => {
                    self.store.mark_deferred_send(send.id, DeferredStatus::Sent)?;
                    delivered += 1;
                }
                Ok(_) => {
                    self.store
                        .mark_deferred_send(send.id, DeferredStatus::Expired)?;
                }
                Err(e) => {
                    // Transient: leave queued for the next sweep.
                    warn!(user_id = %send.user_id, error = %e, "deferred delivery failed");
                }
            }
        }
        Ok(delivered)
    }

    /// Nightly reflection plus the feedback timeout sweep.
    pub async fn run_reflection(&self) -> NudgeResult<ReflectionReport> {
        let closed = self.tracker.close_expired(Utc::now())?;
        debug!(closed, "expired feedback records closed");
        self.reflection.run_all(Utc::now())
    }

    /// Entry point for the reactive side: a user wrote something.
    ///
    /// Logs the message, bumps activity counters, classifies any pending
    /// feedback, and applies meta-feedback.
    pub async fn on_user_message(&self, user_id: &str, text: &str) -> NudgeResult<Vec<Outcome>> {
        let now = Utc::now();
        self.store
            .log_message(&StoredMessage::from_user(user_id, text))?;

        // Re-fetch immediately before updating; last write wins.
        if let Some(mut profile) = self.store.get_profile(user_id)? {
            profile.message_count += 1;
            profile.last_active_at = Some(now);
            self.store.upsert_profile(&profile)?;
        }

        self.tracker.on_user_message(user_id, text, now)
    }

    /// Hand stored borderline insights to the reactive side.
    pub fn take_insights(&self, user_id: &str) -> NudgeResult<Vec<DeferredInsight>> {
        self.store.take_insights(user_id)
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
