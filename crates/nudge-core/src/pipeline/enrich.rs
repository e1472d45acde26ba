//! Cross-signal enrichment.
//!
//! Pure, synchronous annotation of signal combinations present in the
//! current batch. Enrichment never drops or adds signals, only mutates
//! matched signals' payloads in place. Tie-breaks are fixed (longest gap,
//! nearest deadline) so a given input set always produces the same output.

use serde_json::{json, Value};

use crate::types::{Signal, SignalType};

/// Annotates signal combinations with derived hints.
#[derive(Debug, Default)]
pub struct Enricher;

impl Enricher {
    pub fn new() -> Self {
        Self
    }

    /// Apply all enrichment rules to the batch.
    pub fn enrich(&self, signals: &mut [Signal]) {
        self.suggest_task_for_gap(signals);
        self.escalate_care(signals);
        self.bedtime_reminder(signals);
    }

    /// Free-time gap + approaching deadline: attach the most urgent nearby
    /// deadline as a suggested task on the longest gap.
    fn suggest_task_for_gap(&self, signals: &mut [Signal]) {
        let deadline = signals
            .iter()
            .enumerate()
            .filter(|(_, s)| s.signal_type == SignalType::ApproachingDeadline)
            .max_by(|(_, a), (_, b)| {
                // Most urgent first; nearest due date breaks ties.
                (a.urgency, std::cmp::Reverse(a.data_str("due_at").unwrap_or("")))
                    .cmp(&(b.urgency, std::cmp::Reverse(b.data_str("due_at").unwrap_or(""))))
            })
            .map(|(i, s)| {
                (
                    i,
                    s.data_str("title").unwrap_or("upcoming work").to_string(),
                    s.data_str("course").map(str::to_string),
                )
            });

        let Some((_, task, course)) = deadline else {
            return;
        };

        let gap = signals
            .iter_mut()
            .filter(|s| s.signal_type == SignalType::FreeTimeGap)
            .max_by(|a, b| {
                let la = a.data_f64("minutes").unwrap_or(0.0);
                let lb = b.data_f64("minutes").unwrap_or(0.0);
                la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
            });

        if let Some(gap) = gap {
            gap.annotate("suggested_task", Value::String(task));
            if let Some(course) = course {
                gap.annotate("suggested_course", Value::String(course));
            }
        }
    }

    /// Low mood on a busy day deserves a gentler, care-first tone.
    fn escalate_care(&self, signals: &mut [Signal]) {
        let busy = signals
            .iter()
            .any(|s| s.signal_type == SignalType::BusyDay);
        if !busy {
            return;
        }
        for signal in signals
            .iter_mut()
            .filter(|s| s.signal_type == SignalType::LowMood)
        {
            signal.annotate("care_escalation", json!(true));
        }
    }

    /// Habit at risk while the evening window is open: flag for a bedtime
    /// reminder instead of a daytime nudge.
    fn bedtime_reminder(&self, signals: &mut [Signal]) {
        let evening = signals
            .iter()
            .any(|s| s.signal_type == SignalType::EveningWindow);
        if !evening {
            return;
        }
        for signal in signals
            .iter_mut()
            .filter(|s| s.signal_type == SignalType::HabitAtRisk)
        {
            signal.annotate("bedtime_reminder", json!(true));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalSource;
    use serde_json::Map;

    fn signal(signal_type: SignalType, entries: &[(&str, Value)]) -> Signal {
        let data: Map<String, Value> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Signal::new(signal_type, "user-1", data, SignalSource::Internal)
    }

    #[test]
    fn test_suggested_task_attaches_to_longest_gap() {
        let mut signals = vec![
            signal(SignalType::FreeTimeGap, &[("minutes", json!(30))]),
            signal(SignalType::FreeTimeGap, &[("minutes", json!(90))]),
            signal(
                SignalType::ApproachingDeadline,
                &[("title", json!("Essay Draft")), ("course", json!("ENG 201"))],
            ),
        ];

        Enricher::new().enrich(&mut signals);

        assert!(signals[0].data_str("suggested_task").is_none());
        assert_eq!(signals[1].data_str("suggested_task"), Some("Essay Draft"));
        assert_eq!(signals[1].data_str("suggested_course"), Some("ENG 201"));
    }

    #[test]
    fn test_most_urgent_deadline_wins() {
        let mut signals = vec![
            signal(SignalType::FreeTimeGap, &[("minutes", json!(60))]),
            signal(
                SignalType::ApproachingDeadline,
                &[("title", json!("Reading"))],
            )
            .with_urgency(5),
            signal(
                SignalType::ApproachingDeadline,
                &[("title", json!("Final Project"))],
            )
            .with_urgency(9),
        ];

        Enricher::new().enrich(&mut signals);
        assert_eq!(signals[0].data_str("suggested_task"), Some("Final Project"));
    }

    #[test]
    fn test_care_escalation_requires_busy_day() {
        let mut alone = vec![signal(SignalType::LowMood, &[])];
        Enricher::new().enrich(&mut alone);
        assert!(alone[0].data.get("care_escalation").is_none());

        let mut paired = vec![
            signal(SignalType::LowMood, &[]),
            signal(SignalType::BusyDay, &[]),
        ];
        Enricher::new().enrich(&mut paired);
        assert_eq!(paired[0].data["care_escalation"], json!(true));
    }

    #[test]
    fn test_bedtime_reminder() {
        let mut signals = vec![
            signal(SignalType::HabitAtRisk, &[("habit", json!("reading"))]),
            signal(SignalType::EveningWindow, &[]),
        ];
        Enricher::new().enrich(&mut signals);
        assert_eq!(signals[0].data["bedtime_reminder"], json!(true));
    }

    #[test]
    fn test_enrichment_never_changes_count() {
        let mut signals = vec![
            signal(SignalType::FreeTimeGap, &[("minutes", json!(45))]),
            signal(SignalType::ApproachingDeadline, &[("title", json!("Lab"))]),
            signal(SignalType::LowMood, &[]),
        ];
        Enricher::new().enrich(&mut signals);
        assert_eq!(signals.len(), 3);
    }

    #[test]
    fn test_deterministic_over_same_input() {
        let build = || {
            vec![
                signal(SignalType::FreeTimeGap, &[("minutes", json!(45))]),
                signal(SignalType::FreeTimeGap, &[("minutes", json!(45))]),
                signal(SignalType::ApproachingDeadline, &[("title", json!("Lab"))]),
            ]
        };
        let mut a = build();
        let mut b = build();
        Enricher::new().enrich(&mut a);
        Enricher::new().enrich(&mut b);

        let annotated_a: Vec<bool> = a
            .iter()
            .map(|s| s.data.contains_key("suggested_task"))
            .collect();
        let annotated_b: Vec<bool> = b
            .iter()
            .map(|s| s.data.contains_key("suggested_task"))
            .collect();
        assert_eq!(annotated_a, annotated_b);
    }
}
