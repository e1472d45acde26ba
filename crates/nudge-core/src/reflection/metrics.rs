//! Feedback-derived metrics with recency-weighted learning.
//!
//! All weights use a 14-day half-life: an outcome from two weeks ago counts
//! half as much as one from today. Statistical metrics require a minimum
//! sample count before they are written at all.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde_json::{json, Value};
use strum::IntoEnumIterator;

use crate::types::{
    Category, CategorySuppression, FeedbackRecord, MessageFormat, Outcome, SuppressionEntry,
    SuppressionReason,
};

/// Recency half-life for feedback weighting.
pub const HALF_LIFE_DAYS: f64 = 14.0;
/// Minimum samples before a per-category preference is trusted.
pub const MIN_CATEGORY_SAMPLES: usize = 3;
/// Window for auto-suppression counting.
pub const SUPPRESSION_WINDOW_DAYS: i64 = 14;
/// Sends with zero engagement that trigger auto-suppression.
pub const SUPPRESSION_SEND_COUNT: usize = 5;
/// Negative replies that trigger auto-suppression.
pub const SUPPRESSION_NEGATIVE_COUNT: usize = 3;
/// Probation length before a non-permanent suppression may lift.
pub const PROBATION_DAYS: i64 = 7;
/// Week-over-week change (in percentage points) that counts as a trend.
pub const TREND_DELTA_PP: f64 = 10.0;

/// Weight of an outcome observed `age` before now.
pub fn recency_weight(sent_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - sent_at).num_seconds() as f64 / 86_400.0;
    if age_days <= 0.0 {
        return 1.0;
    }
    0.5_f64.powf(age_days / HALF_LIFE_DAYS)
}

fn terminal(records: &[FeedbackRecord]) -> impl Iterator<Item = &FeedbackRecord> {
    records.iter().filter(|r| r.outcome.is_terminal())
}

/// Recency-weighted preference score per category. Categories under the
/// minimum sample count are omitted.
pub fn category_preferences(records: &[FeedbackRecord], now: DateTime<Utc>) -> (Value, usize) {
    let mut out = serde_json::Map::new();
    let mut total_samples = 0;

    for category in Category::iter() {
        let scored: Vec<(f64, f64)> = terminal(records)
            .filter(|r| r.category == category)
            .filter_map(|r| {
                r.feedback_score
                    .map(|score| (score, recency_weight(r.sent_at, now)))
            })
            .collect();
        if scored.len() < MIN_CATEGORY_SAMPLES {
            continue;
        }

        let weight_sum: f64 = scored.iter().map(|(_, w)| w).sum();
        let score = if weight_sum > 0.0 {
            scored.iter().map(|(s, w)| s * w).sum::<f64>() / weight_sum
        } else {
            0.0
        };
        total_samples += scored.len();
        out.insert(
            category.to_string(),
            json!({ "score": score, "samples": scored.len() }),
        );
    }

    (Value::Object(out), total_samples)
}

/// Week-over-week engagement trend per category.
pub fn engagement_trends(records: &[FeedbackRecord], now: DateTime<Utc>) -> (Value, usize) {
    let week_ago = now - Duration::days(7);
    let two_weeks_ago = now - Duration::days(14);
    let mut out = serde_json::Map::new();
    let mut samples = 0;

    for category in Category::iter() {
        let rate = |from: DateTime<Utc>, to: DateTime<Utc>| -> Option<f64> {
            let in_window: Vec<&FeedbackRecord> = terminal(records)
                .filter(|r| r.category == category && r.sent_at >= from && r.sent_at < to)
                .collect();
            if in_window.is_empty() {
                return None;
            }
            let engaged = in_window.iter().filter(|r| r.outcome.is_engaged()).count();
            Some(engaged as f64 / in_window.len() as f64 * 100.0)
        };

        let (Some(this_week), Some(last_week)) = (rate(week_ago, now), rate(two_weeks_ago, week_ago))
        else {
            continue;
        };

        let trend = if this_week - last_week >= TREND_DELTA_PP {
            "rising"
        } else if last_week - this_week >= TREND_DELTA_PP {
            "falling"
        } else {
            "stable"
        };
        samples += 1;
        out.insert(
            category.to_string(),
            json!({ "trend": trend, "this_week_pct": this_week, "last_week_pct": last_week }),
        );
    }

    (Value::Object(out), samples)
}

/// Hours of day that historically engage, and hours that backfire.
pub fn send_hours(records: &[FeedbackRecord]) -> (Value, usize) {
    let mut engaged = [0u32; 24];
    let mut negative = [0u32; 24];
    let mut samples = 0;

    for record in terminal(records) {
        let hour = record.sent_at.hour() as usize;
        samples += 1;
        if record.outcome.is_engaged() {
            engaged[hour] += 1;
        } else if record.outcome.is_negative() {
            negative[hour] += 1;
        }
    }

    let peak: Vec<usize> = (0..24).filter(|&h| engaged[h] >= 2).collect();
    let avoid: Vec<usize> = (0..24)
        .filter(|&h| negative[h] >= 2 && engaged[h] == 0)
        .collect();
    (json!({ "peak": peak, "avoid": avoid }), samples)
}

/// Delivery format with the best weighted engagement, if any format has
/// enough history.
pub fn preferred_format(records: &[FeedbackRecord], now: DateTime<Utc>) -> Option<(Value, usize)> {
    let mut best: Option<(MessageFormat, f64)> = None;
    let mut total = 0;

    for format in MessageFormat::iter() {
        let sent: Vec<&FeedbackRecord> = terminal(records)
            .filter(|r| r.format == format)
            .collect();
        if sent.len() < MIN_CATEGORY_SAMPLES {
            continue;
        }
        total += sent.len();

        let weight_sum: f64 = sent.iter().map(|r| recency_weight(r.sent_at, now)).sum();
        let engaged_weight: f64 = sent
            .iter()
            .filter(|r| r.outcome.is_engaged())
            .map(|r| recency_weight(r.sent_at, now))
            .sum();
        let rate = if weight_sum > 0.0 {
            engaged_weight / weight_sum
        } else {
            0.0
        };
        if best.map(|(_, b)| rate > b).unwrap_or(true) {
            best = Some((format, rate));
        }
    }

    best.map(|(format, rate)| {
        (
            json!({ "format": format.to_string(), "engagement_rate": rate }),
            total,
        )
    })
}

/// Adaptive engagement window: three times the median reply latency,
/// clamped to [30, 180] minutes.
pub fn engagement_window(records: &[FeedbackRecord]) -> Option<(Value, usize)> {
    let mut latencies: Vec<i64> = terminal(records)
        .filter_map(|r| r.response_latency_seconds)
        .map(|secs| secs / 60)
        .collect();
    if latencies.is_empty() {
        return None;
    }
    latencies.sort_unstable();
    let median = latencies[latencies.len() / 2];
    let window = (median * 3).clamp(30, 180);
    Some((json!({ "minutes": window }), latencies.len()))
}

/// Recompute category suppression.
///
/// Auto-suppression triggers on sustained non-engagement or repeated
/// negative replies inside the rolling window. Existing permanent entries
/// are kept forever; probationary entries lift only when an engaged outcome
/// occurred during the probation window, otherwise probation extends.
pub fn category_suppression(
    existing: CategorySuppression,
    records: &[FeedbackRecord],
    now: DateTime<Utc>,
) -> CategorySuppression {
    let window_start = now - Duration::days(SUPPRESSION_WINDOW_DAYS);
    let mut next = CategorySuppression::default();

    // Carry forward existing entries, handling probation.
    for entry in existing.suppressed {
        if entry.reason.is_permanent() {
            next.suppressed.push(entry);
            continue;
        }
        let probation_until = entry
            .probation_until
            .unwrap_or(entry.since + Duration::days(PROBATION_DAYS));
        if now < probation_until {
            next.suppressed.push(SuppressionEntry {
                probation_until: Some(probation_until),
                ..entry
            });
            continue;
        }
        let engaged_in_probation = terminal(records).any(|r| {
            r.category == entry.category
                && r.sent_at >= entry.since
                && r.outcome.is_engaged()
        });
        if engaged_in_probation {
            // Lifted: drop the entry.
            continue;
        }
        next.suppressed.push(SuppressionEntry {
            probation_until: Some(now + Duration::days(PROBATION_DAYS)),
            ..entry
        });
    }

    // Fresh auto-suppression from recent history.
    for category in Category::iter() {
        if next.contains(category) {
            continue;
        }
        let recent: Vec<&FeedbackRecord> = terminal(records)
            .filter(|r| r.category == category && r.sent_at >= window_start)
            .collect();
        let engaged = recent.iter().filter(|r| r.outcome.is_engaged()).count();
        let negative = recent.iter().filter(|r| r.outcome.is_negative()).count();

        if negative >= SUPPRESSION_NEGATIVE_COUNT {
            next.suppressed.push(SuppressionEntry {
                category,
                reason: SuppressionReason::NegativeFeedback,
                since: now,
                probation_until: Some(now + Duration::days(PROBATION_DAYS)),
            });
        } else if recent.len() >= SUPPRESSION_SEND_COUNT && engaged == 0 {
            next.suppressed.push(SuppressionEntry {
                category,
                reason: SuppressionReason::LowEngagement,
                since: now,
                probation_until: Some(now + Duration::days(PROBATION_DAYS)),
            });
        }
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionKind, Candidate, SignalType};

    fn record(
        category: Category,
        outcome: Outcome,
        days_ago: i64,
        now: DateTime<Utc>,
    ) -> FeedbackRecord {
        let candidate = Candidate {
            message: "m".into(),
            relevance: 7.0,
            timing: 7.0,
            urgency: 7.0,
            category,
            trigger_signals: vec![SignalType::ApproachingDeadline],
            action_type: ActionKind::Text,
            link: None,
            explored: false,
        };
        let sent_at = now - Duration::days(days_ago);
        let mut record =
            FeedbackRecord::pending("user-1", &candidate, MessageFormat::Text, sent_at);
        record.close(outcome, Some(sent_at + Duration::minutes(10)));
        record
    }

    #[test]
    fn test_recency_weight_half_life() {
        let now = Utc::now();
        assert!((recency_weight(now, now) - 1.0).abs() < 1e-9);
        let half = recency_weight(now - Duration::days(14), now);
        assert!((half - 0.5).abs() < 0.01);
        let quarter = recency_weight(now - Duration::days(28), now);
        assert!((quarter - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_category_preferences_min_samples() {
        let now = Utc::now();
        let records = vec![
            record(Category::Habit, Outcome::PositiveReply, 1, now),
            record(Category::Habit, Outcome::PositiveReply, 2, now),
        ];
        let (value, _) = category_preferences(&records, now);
        // Two samples: below the minimum of three, omitted.
        assert!(value.get("habit").is_none());

        let records = vec![
            record(Category::Habit, Outcome::PositiveReply, 1, now),
            record(Category::Habit, Outcome::PositiveReply, 2, now),
            record(Category::Habit, Outcome::NegativeReply, 3, now),
        ];
        let (value, samples) = category_preferences(&records, now);
        assert!(value["habit"]["score"].as_f64().unwrap() > 0.0);
        assert_eq!(samples, 3);
    }

    #[test]
    fn test_recent_outcomes_weigh_more() {
        let now = Utc::now();
        // Old positives, fresh negatives: score should lean negative
        // relative to the unweighted mean.
        let records = vec![
            record(Category::Habit, Outcome::PositiveReply, 28, now),
            record(Category::Habit, Outcome::PositiveReply, 28, now),
            record(Category::Habit, Outcome::NegativeReply, 0, now),
            record(Category::Habit, Outcome::NegativeReply, 0, now),
        ];
        let (value, _) = category_preferences(&records, now);
        let score = value["habit"]["score"].as_f64().unwrap();
        // Unweighted mean would be 0.25; recency pulls it below zero.
        assert!(score < 0.0, "got {}", score);
    }

    #[test]
    fn test_engagement_trends() {
        let now = Utc::now();
        let mut records = Vec::new();
        // Last week: 1 of 4 engaged (25%).
        records.push(record(Category::Nudge, Outcome::PositiveReply, 10, now));
        for _ in 0..3 {
            records.push(record(Category::Nudge, Outcome::Ignored, 10, now));
        }
        // This week: 3 of 4 engaged (75%).
        for _ in 0..3 {
            records.push(record(Category::Nudge, Outcome::PositiveReply, 2, now));
        }
        records.push(record(Category::Nudge, Outcome::Ignored, 2, now));

        let (value, _) = engagement_trends(&records, now);
        assert_eq!(value["nudge"]["trend"], "rising");
    }

    #[test]
    fn test_engagement_trend_stable_within_delta() {
        let now = Utc::now();
        let mut records = Vec::new();
        for _ in 0..2 {
            records.push(record(Category::Nudge, Outcome::PositiveReply, 10, now));
            records.push(record(Category::Nudge, Outcome::Ignored, 10, now));
            records.push(record(Category::Nudge, Outcome::PositiveReply, 2, now));
            records.push(record(Category::Nudge, Outcome::Ignored, 2, now));
        }
        let (value, _) = engagement_trends(&records, now);
        assert_eq!(value["nudge"]["trend"], "stable");
    }

    #[test]
    fn test_auto_suppression_at_five_unengaged_sends() {
        let now = Utc::now();
        let records: Vec<FeedbackRecord> = (0..5)
            .map(|i| record(Category::Social, Outcome::Ignored, i, now))
            .collect();
        let suppression = category_suppression(CategorySuppression::default(), &records, now);
        let entry = suppression.get(Category::Social).unwrap();
        assert_eq!(entry.reason, SuppressionReason::LowEngagement);
        assert!(entry.probation_until.is_some());
    }

    #[test]
    fn test_no_suppression_at_four_sends() {
        let now = Utc::now();
        let records: Vec<FeedbackRecord> = (0..4)
            .map(|i| record(Category::Social, Outcome::Ignored, i, now))
            .collect();
        let suppression = category_suppression(CategorySuppression::default(), &records, now);
        assert!(!suppression.contains(Category::Social));
    }

    #[test]
    fn test_suppression_on_three_negatives() {
        let now = Utc::now();
        let records: Vec<FeedbackRecord> = (0..3)
            .map(|i| record(Category::Wellbeing, Outcome::NegativeReply, i, now))
            .collect();
        let suppression = category_suppression(CategorySuppression::default(), &records, now);
        let entry = suppression.get(Category::Wellbeing).unwrap();
        assert_eq!(entry.reason, SuppressionReason::NegativeFeedback);
    }

    #[test]
    fn test_permanent_suppression_survives() {
        let now = Utc::now();
        let existing = CategorySuppression {
            suppressed: vec![SuppressionEntry {
                category: Category::Wellbeing,
                reason: SuppressionReason::ExplicitStop,
                since: now - Duration::days(100),
                probation_until: None,
            }],
        };
        let suppression = category_suppression(existing, &[], now);
        assert!(suppression.contains(Category::Wellbeing));
        assert!(suppression
            .get(Category::Wellbeing)
            .unwrap()
            .probation_until
            .is_none());
    }

    #[test]
    fn test_probation_lifts_on_engagement() {
        let now = Utc::now();
        let existing = CategorySuppression {
            suppressed: vec![SuppressionEntry {
                category: Category::Social,
                reason: SuppressionReason::LowEngagement,
                since: now - Duration::days(10),
                probation_until: Some(now - Duration::days(1)),
            }],
        };
        // An engaged outcome during probation lifts the suppression.
        let records = vec![record(Category::Social, Outcome::PositiveReply, 3, now)];
        let suppression = category_suppression(existing, &records, now);
        assert!(!suppression.contains(Category::Social));
    }

    #[test]
    fn test_probation_extends_without_engagement() {
        let now = Utc::now();
        let existing = CategorySuppression {
            suppressed: vec![SuppressionEntry {
                category: Category::Social,
                reason: SuppressionReason::LowEngagement,
                since: now - Duration::days(10),
                probation_until: Some(now - Duration::days(1)),
            }],
        };
        let suppression = category_suppression(existing, &[], now);
        let entry = suppression.get(Category::Social).unwrap();
        assert!(entry.probation_until.unwrap() > now);
    }

    #[test]
    fn test_engagement_window_clamps() {
        let now = Utc::now();
        let mut records = vec![record(Category::Habit, Outcome::PositiveReply, 1, now)];
        records[0].response_latency_seconds = Some(5 * 60);
        // Median 5 minutes: 3x is 15, clamped up to 30.
        let (value, _) = engagement_window(&records).unwrap();
        assert_eq!(value["minutes"], 30);

        records[0].response_latency_seconds = Some(120 * 60);
        // Median 120 minutes: 3x is 360, clamped down to 180.
        let (value, _) = engagement_window(&records).unwrap();
        assert_eq!(value["minutes"], 180);
    }

    #[test]
    fn test_preferred_format_needs_samples() {
        let now = Utc::now();
        let records = vec![record(Category::Habit, Outcome::PositiveReply, 1, now)];
        assert!(preferred_format(&records, now).is_none());

        let records: Vec<FeedbackRecord> = (0..4)
            .map(|i| record(Category::Habit, Outcome::PositiveReply, i, now))
            .collect();
        let (value, _) = preferred_format(&records, now).unwrap();
        assert_eq!(value["format"], "text");
    }
}
