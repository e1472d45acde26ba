//! Raw-activity behaviors, derived from the conversation log alone.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde_json::{json, Value};

use crate::types::{FeedbackRecord, MessageRole, Outcome, StoredMessage};

/// How far back raw-activity metrics look.
pub const ACTIVITY_WINDOW_DAYS: i64 = 30;

/// Hours of day (0-23) ranked by user activity.
pub fn active_hours(messages: &[StoredMessage]) -> (Value, usize) {
    let mut histogram = [0u32; 24];
    let mut samples = 0;
    for message in messages.iter().filter(|m| m.role == MessageRole::User) {
        histogram[message.created_at.hour() as usize] += 1;
        samples += 1;
    }

    let mut ranked: Vec<usize> = (0..24).collect();
    ranked.sort_by_key(|&h| std::cmp::Reverse(histogram[h]));
    let top: Vec<usize> = ranked
        .into_iter()
        .take(4)
        .filter(|&h| histogram[h] > 0)
        .collect();

    (json!({ "histogram": histogram.to_vec(), "top_hours": top }), samples)
}

/// Preferred message length bucket from the user's own messages.
pub fn message_length(messages: &[StoredMessage]) -> (Value, usize) {
    let lengths: Vec<usize> = messages
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .map(|m| m.content.split_whitespace().count())
        .collect();
    if lengths.is_empty() {
        return (json!({ "bucket": "medium", "avg_words": 0 }), 0);
    }

    let avg = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
    let bucket = if avg < 8.0 {
        "short"
    } else if avg < 25.0 {
        "medium"
    } else {
        "long"
    };
    (
        json!({ "bucket": bucket, "avg_words": avg.round() as u64 }),
        lengths.len(),
    )
}

/// Median minutes between an assistant message and the next user reply.
pub fn response_speed(messages: &[StoredMessage]) -> (Value, usize) {
    let mut latencies: Vec<i64> = Vec::new();
    let mut awaiting: Option<DateTime<Utc>> = None;
    for message in messages {
        match message.role {
            MessageRole::Assistant => awaiting = Some(message.created_at),
            MessageRole::User => {
                if let Some(sent) = awaiting.take() {
                    let minutes = (message.created_at - sent).num_minutes();
                    if minutes >= 0 {
                        latencies.push(minutes);
                    }
                }
            }
        }
    }
    if latencies.is_empty() {
        return (json!({ "median_minutes": Value::Null }), 0);
    }
    latencies.sort_unstable();
    let median = latencies[latencies.len() / 2];
    (
        json!({ "median_minutes": median }),
        latencies.len(),
    )
}

/// Crude formality heuristics from the user's writing.
pub fn language_register(messages: &[StoredMessage]) -> (Value, usize) {
    let user_messages: Vec<&StoredMessage> = messages
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .collect();
    if user_messages.is_empty() {
        return (json!({ "emoji_rate": 0.0, "casual": false }), 0);
    }

    let with_emoji = user_messages
        .iter()
        .filter(|m| m.content.chars().any(|c| c as u32 >= 0x1F300))
        .count();
    let lowercase_starts = user_messages
        .iter()
        .filter(|m| {
            m.content
                .chars()
                .next()
                .map(|c| c.is_lowercase())
                .unwrap_or(false)
        })
        .count();

    let emoji_rate = with_emoji as f64 / user_messages.len() as f64;
    let casual = emoji_rate > 0.2 || lowercase_starts as f64 / user_messages.len() as f64 > 0.5;
    (
        json!({ "emoji_rate": emoji_rate, "casual": casual }),
        user_messages.len(),
    )
}

/// Per-signal-type send and ignore counts from feedback history.
///
/// Feeds the prefilter's urgency penalty for types the user tunes out.
pub fn signal_sensitivity(records: &[FeedbackRecord]) -> (Value, usize) {
    use std::collections::BTreeMap;

    let mut stats: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for record in records {
        if record.outcome == Outcome::Pending {
            continue;
        }
        for signal_type in &record.trigger_signals {
            let entry = stats.entry(signal_type.to_string()).or_default();
            entry.0 += 1;
            if record.outcome == Outcome::Ignored {
                entry.1 += 1;
            }
        }
    }

    let samples = records
        .iter()
        .filter(|r| r.outcome != Outcome::Pending)
        .count();
    let value: serde_json::Map<String, Value> = stats
        .into_iter()
        .map(|(signal_type, (sends, ignores))| {
            let rate = if sends > 0 {
                ignores as f64 / sends as f64
            } else {
                0.0
            };
            (
                signal_type,
                json!({ "sends": sends, "ignores": ignores, "ignore_rate": rate }),
            )
        })
        .collect();

    (Value::Object(value), samples)
}

/// Messages inside the activity window, oldest first.
pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(ACTIVITY_WINDOW_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 3, hour, minute, 0).unwrap()
    }

    fn user_msg(content: &str, created_at: DateTime<Utc>) -> StoredMessage {
        let mut m = StoredMessage::from_user("user-1", content);
        m.created_at = created_at;
        m
    }

    fn assistant_msg(created_at: DateTime<Utc>) -> StoredMessage {
        let mut m = StoredMessage::from_assistant("user-1", "hello", true);
        m.created_at = created_at;
        m
    }

    #[test]
    fn test_active_hours_ranks_by_volume() {
        let messages = vec![
            user_msg("a", at(9, 0)),
            user_msg("b", at(9, 30)),
            user_msg("c", at(21, 0)),
        ];
        let (value, samples) = active_hours(&messages);
        assert_eq!(samples, 3);
        assert_eq!(value["top_hours"][0], 9);
    }

    #[test]
    fn test_message_length_buckets() {
        let short = vec![user_msg("ok thanks", at(9, 0))];
        let (value, _) = message_length(&short);
        assert_eq!(value["bucket"], "short");

        let long_text = "word ".repeat(40);
        let long = vec![user_msg(&long_text, at(9, 0))];
        let (value, _) = message_length(&long);
        assert_eq!(value["bucket"], "long");
    }

    #[test]
    fn test_response_speed_median() {
        let messages = vec![
            assistant_msg(at(9, 0)),
            user_msg("hi", at(9, 10)),
            assistant_msg(at(12, 0)),
            user_msg("yo", at(12, 30)),
            assistant_msg(at(15, 0)),
            user_msg("hey", at(15, 50)),
        ];
        let (value, samples) = response_speed(&messages);
        assert_eq!(samples, 3);
        assert_eq!(value["median_minutes"], 30);
    }

    #[test]
    fn test_response_speed_empty() {
        let (value, samples) = response_speed(&[]);
        assert_eq!(samples, 0);
        assert!(value["median_minutes"].is_null());
    }

    #[test]
    fn test_language_register_emoji() {
        let messages = vec![
            user_msg("nice 🎉", at(9, 0)),
            user_msg("cool 🚀", at(10, 0)),
            user_msg("ok", at(11, 0)),
        ];
        let (value, _) = language_register(&messages);
        assert!(value["emoji_rate"].as_f64().unwrap() > 0.5);
        assert_eq!(value["casual"], true);
    }
}
