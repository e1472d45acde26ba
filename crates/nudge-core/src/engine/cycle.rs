//! Cycle and loop outcome reporting.

use chrono::{DateTime, Utc};

use crate::pipeline::prefilter::BlockReason;
use crate::types::{Category, MessageFormat};

/// What one user's cycle amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A message went out.
    Sent {
        category: Category,
        format: MessageFormat,
    },
    /// Quiet hours blocked delivery; the winner was queued for the wake
    /// hour instead.
    Deferred,
    /// A hard gate stopped the cycle before generation.
    Blocked(BlockReason),
    /// Generation and scoring produced nothing worth sending.
    NoCandidates,
    /// The channel rejected the message; recorded, no retry this cycle.
    DeliveryFailed,
}

/// Summary of one fan-out over all onboarded users.
#[derive(Debug, Clone, Default)]
pub struct LoopReport {
    pub processed: usize,
    pub sent: usize,
    pub deferred: usize,
    pub blocked: usize,
    pub no_candidates: usize,
    pub delivery_failed: usize,
    /// Per-user errors (non-fatal, the fan-out continued).
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LoopReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            ..Default::default()
        }
    }

    /// Fold one user's outcome into the tally.
    pub fn record(&mut self, outcome: &CycleOutcome) {
        self.processed += 1;
        match outcome {
            CycleOutcome::Sent { .. } => self.sent += 1,
            CycleOutcome::Deferred => self.deferred += 1,
            CycleOutcome::Blocked(_) => self.blocked += 1,
            CycleOutcome::NoCandidates => self.no_candidates += 1,
            CycleOutcome::DeliveryFailed => self.delivery_failed += 1,
        }
    }

    pub fn complete(mut self) -> Self {
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_tally() {
        let mut report = LoopReport::new(Utc::now());
        report.record(&CycleOutcome::Sent {
            category: Category::Nudge,
            format: MessageFormat::Text,
        });
        report.record(&CycleOutcome::Blocked(BlockReason::Cooldown));
        report.record(&CycleOutcome::NoCandidates);
        report.record(&CycleOutcome::Deferred);

        assert_eq!(report.processed, 4);
        assert_eq!(report.sent, 1);
        assert_eq!(report.blocked, 1);
        assert_eq!(report.no_candidates, 1);
        assert_eq!(report.deferred, 1);

        let completed = report.complete();
        assert!(completed.completed_at.is_some());
        assert!(completed.duration_ms().unwrap() >= 0);
    }
}
