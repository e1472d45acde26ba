//! Signal deduplication against persisted sighting state.
//!
//! Every sighting updates state (`times_seen`, `last_seen`) whether or not
//! the signal is re-emitted; emission itself is gated on the per-type
//! re-emit interval. Durable conditions resurface on that cadence instead
//! of flooding every tick.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::NudgeResult;
use crate::store::ProactiveStore;
use crate::types::{Signal, SignalState};

/// Deduplicator suppresses repeats faster than their re-emit interval.
pub struct Deduplicator {
    store: Arc<dyn ProactiveStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn ProactiveStore>) -> Self {
        Self { store }
    }

    /// Filter a user's signal batch down to the subset allowed to proceed.
    ///
    /// Dedup keys must already be computed on every signal. State rows are
    /// batch-loaded up front, bumped for every sighting, and written back.
    pub fn filter(
        &self,
        user_id: &str,
        signals: Vec<Signal>,
        now: DateTime<Utc>,
    ) -> NudgeResult<Vec<Signal>> {
        if signals.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = signals.iter().map(|s| s.dedup_key.clone()).collect();
        let mut states: HashMap<String, SignalState> = self
            .store
            .get_signal_states(user_id, &keys)?
            .into_iter()
            .map(|s| (s.dedup_key.clone(), s))
            .collect();

        let mut emitted = Vec::with_capacity(signals.len());
        for signal in signals {
            match states.get_mut(&signal.dedup_key) {
                None => {
                    let state = SignalState::first(user_id, &signal.dedup_key, now);
                    self.store.upsert_signal_state(&state)?;
                    states.insert(signal.dedup_key.clone(), state);
                    emitted.push(signal);
                }
                Some(state) => {
                    let due_at = state.last_seen + signal.signal_type.reemit_interval();
                    let emit = now >= due_at;
                    state.sighted(now);
                    self.store.upsert_signal_state(state)?;
                    if emit {
                        emitted.push(signal);
                    } else {
                        debug!(
                            user_id,
                            dedup_key = %signal.dedup_key,
                            "signal suppressed until {}", due_at
                        );
                    }
                }
            }
        }
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{SignalSource, SignalType};
    use chrono::Duration;
    use serde_json::Map;

    fn signal(signal_type: SignalType) -> Signal {
        Signal::new(signal_type, "user-1", Map::new(), SignalSource::Internal)
    }

    fn dedup() -> (Deduplicator, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        (Deduplicator::new(store.clone()), store)
    }

    #[test]
    fn test_first_sighting_emits_and_creates_state() {
        let (dedup, store) = dedup();
        let now = Utc::now();

        let out = dedup
            .filter("user-1", vec![signal(SignalType::LowMood)], now)
            .unwrap();
        assert_eq!(out.len(), 1);

        let states = store
            .get_signal_states("user-1", &["low_mood:daily".into()])
            .unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].times_seen, 1);
    }

    #[test]
    fn test_repeat_within_interval_suppressed_but_counted() {
        let (dedup, store) = dedup();
        let now = Utc::now();

        dedup
            .filter("user-1", vec![signal(SignalType::LowMood)], now)
            .unwrap();
        let out = dedup
            .filter(
                "user-1",
                vec![signal(SignalType::LowMood)],
                now + Duration::hours(1),
            )
            .unwrap();
        assert!(out.is_empty());

        // Suppressed sightings still bump state.
        let states = store
            .get_signal_states("user-1", &["low_mood:daily".into()])
            .unwrap();
        assert_eq!(states[0].times_seen, 2);
    }

    #[test]
    fn test_reemit_after_interval() {
        let (dedup, _store) = dedup();
        let now = Utc::now();

        dedup
            .filter("user-1", vec![signal(SignalType::ApproachingEvent)], now)
            .unwrap();

        // One hour re-emit interval for approaching events.
        let out = dedup
            .filter(
                "user-1",
                vec![signal(SignalType::ApproachingEvent)],
                now + Duration::minutes(59),
            )
            .unwrap();
        assert!(out.is_empty());

        let out = dedup
            .filter(
                "user-1",
                vec![signal(SignalType::ApproachingEvent)],
                now + Duration::minutes(61),
            )
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_distinct_keys_do_not_interfere() {
        let (dedup, _store) = dedup();
        let now = Utc::now();

        dedup
            .filter("user-1", vec![signal(SignalType::LowMood)], now)
            .unwrap();
        let out = dedup
            .filter(
                "user-1",
                vec![signal(SignalType::BusyDay)],
                now + Duration::minutes(1),
            )
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_empty_batch() {
        let (dedup, _store) = dedup();
        let out = dedup.filter("user-1", Vec::new(), Utc::now()).unwrap();
        assert!(out.is_empty());
    }
}
