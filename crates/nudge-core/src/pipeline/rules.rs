//! Candidate scoring and filtering.
//!
//! Applies the composite score against the trust-scaled threshold, enforces
//! category suppression ahead of any scoring decision, dedups against recent
//! assistant messages, and occasionally explores a borderline candidate so
//! the feedback loop can learn outside its comfort zone. The caller supplies
//! the random source; production uses a thread rng, tests seed their own.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Candidate, Category, TrustInfo};

/// Tunables for candidate selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Probability of accepting a borderline candidate anyway.
    pub exploration_rate: f64,
    /// How far below the threshold exploration may reach.
    pub exploration_margin: f64,
    /// Absolute floor below which nothing is sent or kept.
    pub insight_floor: f64,
    /// Word-set Jaccard overlap above which a candidate repeats a recent
    /// assistant message.
    pub overlap_threshold: f64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            exploration_rate: 0.1,
            exploration_margin: 1.0,
            insight_floor: 4.0,
            overlap_threshold: 0.6,
        }
    }
}

/// Outcome of one selection pass.
#[derive(Debug, Clone, Default)]
pub struct RulesVerdict {
    /// Accepted candidates, sorted by composite score descending. The loop
    /// sends only the first.
    pub survivors: Vec<Candidate>,
    /// Borderline candidates worth keeping for later reactive use.
    pub insights: Vec<Candidate>,
    /// How many candidates a suppressed category removed.
    pub suppressed_count: usize,
    /// How many survivors the recent-message dedup removed.
    pub deduped_count: usize,
}

impl RulesVerdict {
    /// The single candidate this cycle may send.
    pub fn winner(&self) -> Option<&Candidate> {
        self.survivors.first()
    }
}

/// Weighted scoring and suppression enforcement.
pub struct Rules {
    config: RulesConfig,
}

impl Rules {
    pub fn new(config: RulesConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(RulesConfig::default())
    }

    /// Score and filter a candidate batch.
    ///
    /// `recent_assistant` is the text of assistant messages from the recent
    /// conversation window, used to avoid repeating ourselves.
    pub fn select<R: Rng>(
        &self,
        candidates: Vec<Candidate>,
        trust: &TrustInfo,
        suppressed: &[Category],
        recent_assistant: &[String],
        rng: &mut R,
    ) -> RulesVerdict {
        let mut verdict = RulesVerdict::default();
        let threshold = trust.score_threshold;

        let mut accepted: Vec<Candidate> = Vec::new();
        for mut candidate in candidates {
            // Suppression wins over any score.
            if suppressed.contains(&candidate.category) {
                verdict.suppressed_count += 1;
                continue;
            }

            let score = candidate.composite_score();
            if score >= threshold {
                accepted.push(candidate);
            } else if score >= self.config.insight_floor {
                let within_margin = score >= threshold - self.config.exploration_margin;
                if within_margin && rng.gen::<f64>() < self.config.exploration_rate {
                    debug!(category = %candidate.category, score, "exploring borderline candidate");
                    candidate.explored = true;
                    accepted.push(candidate);
                } else {
                    verdict.insights.push(candidate);
                }
            }
            // Below the floor: discard silently.
        }

        // Don't repeat what we just said.
        accepted.retain(|candidate| {
            let repeats = recent_assistant.iter().any(|prior| {
                word_jaccard(&candidate.message, prior) > self.config.overlap_threshold
            });
            if repeats {
                verdict.deduped_count += 1;
            }
            !repeats
        });

        accepted.sort_by(|a, b| {
            b.composite_score()
                .partial_cmp(&a.composite_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        verdict.survivors = accepted;
        verdict
    }
}

/// Word-set Jaccard similarity between two texts.
fn word_jaccard(a: &str, b: &str) -> f64 {
    let set_a = word_set(a);
    let set_b = word_set(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

fn word_set(text: &str) -> std::collections::HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionKind, SignalType, TrustLevel};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn trust(level: TrustLevel) -> TrustInfo {
        TrustInfo::for_level(level, 100, 300)
    }

    fn candidate(message: &str, relevance: f64, timing: f64, urgency: f64) -> Candidate {
        Candidate {
            message: message.to_string(),
            relevance,
            timing,
            urgency,
            category: Category::TaskReminder,
            trigger_signals: vec![SignalType::ApproachingDeadline],
            action_type: ActionKind::Text,
            link: None,
            explored: false,
        }
    }

    fn with_category(mut c: Candidate, category: Category) -> Candidate {
        c.category = category;
        c
    }

    #[test]
    fn test_accepts_above_threshold_and_sorts() {
        let rules = Rules::with_defaults();
        let mut rng = StdRng::seed_from_u64(7);

        let verdict = rules.select(
            vec![
                candidate("first option", 7.0, 7.0, 7.0),
                candidate("second option", 9.0, 9.0, 9.0),
            ],
            &trust(TrustLevel::Deep),
            &[],
            &[],
            &mut rng,
        );

        assert_eq!(verdict.survivors.len(), 2);
        assert_eq!(verdict.winner().unwrap().message, "second option");
    }

    #[test]
    fn test_suppressed_category_rejected_regardless_of_score() {
        let rules = Rules::with_defaults();
        let mut rng = StdRng::seed_from_u64(7);

        let verdict = rules.select(
            vec![with_category(
                candidate("time for a check-in", 9.0, 9.0, 9.0),
                Category::Wellbeing,
            )],
            &trust(TrustLevel::Deep),
            &[Category::Wellbeing],
            &[],
            &mut rng,
        );

        assert!(verdict.survivors.is_empty());
        assert_eq!(verdict.suppressed_count, 1);
        assert!(verdict.insights.is_empty());
    }

    #[test]
    fn test_borderline_becomes_insight_when_not_explored() {
        // Probability zero: exploration can never fire.
        let rules = Rules::new(RulesConfig {
            exploration_rate: 0.0,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(7);

        // Deep threshold 5.0; 4.5 is borderline.
        let verdict = rules.select(
            vec![candidate("almost good enough", 4.5, 4.5, 4.5)],
            &trust(TrustLevel::Deep),
            &[],
            &[],
            &mut rng,
        );

        assert!(verdict.survivors.is_empty());
        assert_eq!(verdict.insights.len(), 1);
    }

    #[test]
    fn test_exploration_accepts_and_marks() {
        // Probability one: exploration always fires inside the margin.
        let rules = Rules::new(RulesConfig {
            exploration_rate: 1.0,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(7);

        let verdict = rules.select(
            vec![candidate("worth a try", 4.5, 4.5, 4.5)],
            &trust(TrustLevel::Deep),
            &[],
            &[],
            &mut rng,
        );

        assert_eq!(verdict.survivors.len(), 1);
        assert!(verdict.survivors[0].explored);
    }

    #[test]
    fn test_exploration_never_reaches_below_floor() {
        let rules = Rules::new(RulesConfig {
            exploration_rate: 1.0,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(7);

        // Score 3.0: below the 4.0 floor, discarded outright.
        let verdict = rules.select(
            vec![candidate("too weak", 3.0, 3.0, 3.0)],
            &trust(TrustLevel::Deep),
            &[],
            &[],
            &mut rng,
        );

        assert!(verdict.survivors.is_empty());
        assert!(verdict.insights.is_empty());
    }

    #[test]
    fn test_exploration_margin_bounds() {
        let rules = Rules::new(RulesConfig {
            exploration_rate: 1.0,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(7);

        // New-tier threshold is 7.0; 5.5 is outside the 1.0 margin but
        // above the floor, so it lands in insights even at rate 1.0.
        let verdict = rules.select(
            vec![candidate("out of reach", 5.5, 5.5, 5.5)],
            &trust(TrustLevel::New),
            &[],
            &[],
            &mut rng,
        );

        assert!(verdict.survivors.is_empty());
        assert_eq!(verdict.insights.len(), 1);
    }

    #[test]
    fn test_recent_message_dedup() {
        let rules = Rules::with_defaults();
        let mut rng = StdRng::seed_from_u64(7);

        let recent =
            vec!["Heads up: your essay draft is due tomorrow at noon".to_string()];
        let verdict = rules.select(
            vec![candidate(
                "Heads up: your essay draft is due tomorrow at noon!",
                9.0,
                9.0,
                9.0,
            )],
            &trust(TrustLevel::Deep),
            &[],
            &recent,
            &mut rng,
        );

        assert!(verdict.survivors.is_empty());
        assert_eq!(verdict.deduped_count, 1);
    }

    #[test]
    fn test_different_text_survives_dedup() {
        let rules = Rules::with_defaults();
        let mut rng = StdRng::seed_from_u64(7);

        let recent = vec!["Good morning! Here's your schedule.".to_string()];
        let verdict = rules.select(
            vec![candidate(
                "Your chemistry lab report is due Friday.",
                9.0,
                9.0,
                9.0,
            )],
            &trust(TrustLevel::Deep),
            &[],
            &recent,
            &mut rng,
        );

        assert_eq!(verdict.survivors.len(), 1);
    }

    #[test]
    fn test_word_jaccard() {
        assert!((word_jaccard("a b c", "a b c") - 1.0).abs() < 1e-9);
        assert!(word_jaccard("a b", "c d") < 1e-9);
        // Case and punctuation insensitive.
        assert!((word_jaccard("Hello, world!", "hello world") - 1.0).abs() < 1e-9);
    }
}
