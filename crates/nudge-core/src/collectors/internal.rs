//! Internal time-window collector.
//!
//! Emits morning-window and evening-window signals derived purely from the
//! user's profile and the clock. Like every collector it never raises;
//! a missing profile just yields no signals.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Timelike, Utc};
use serde_json::Map;
use tracing::warn;

use crate::store::ProactiveStore;
use crate::traits::SignalCollector;
use crate::types::{Signal, SignalSource, SignalType};

/// Hours after wake during which the morning window is open.
const MORNING_SPAN_HOURS: u8 = 2;
/// Hours before sleep during which the evening window is open.
const EVENING_SPAN_HOURS: u8 = 2;

/// Emits time-of-day window signals.
pub struct InternalCollector {
    store: Arc<dyn ProactiveStore>,
}

impl InternalCollector {
    pub fn new(store: Arc<dyn ProactiveStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SignalCollector for InternalCollector {
    fn name(&self) -> &str {
        "internal"
    }

    async fn collect(&self, user_id: &str) -> Vec<Signal> {
        let profile = match self.store.get_profile(user_id) {
            Ok(Some(profile)) => profile,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(user_id, error = %e, "internal collector failed to load profile");
                return Vec::new();
            }
        };

        // TODO: convert through the profile timezone like the prefilter's
        // quiet-hours check does; this reads the raw UTC hour.
        let hour = Utc::now().hour() as u8;

        let mut signals = Vec::new();
        if in_span(hour, profile.wake_hour, MORNING_SPAN_HOURS) {
            signals.push(Signal::new(
                SignalType::MorningWindow,
                user_id,
                Map::new(),
                SignalSource::Internal,
            ));
        }
        let evening_start = (profile.sleep_hour + 24 - EVENING_SPAN_HOURS) % 24;
        if in_span(hour, evening_start, EVENING_SPAN_HOURS) {
            signals.push(Signal::new(
                SignalType::EveningWindow,
                user_id,
                Map::new(),
                SignalSource::Internal,
            ));
        }
        signals
    }
}

/// Whether `hour` falls inside `[start, start + span)` on the 24h clock.
fn in_span(hour: u8, start: u8, span: u8) -> bool {
    let end = (start + span) % 24;
    if start < end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}
