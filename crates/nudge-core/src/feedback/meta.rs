//! Meta-feedback: the user talking about the messages themselves.
//!
//! "Stop sending wellbeing check-ins" or "the reminders are helpful" is
//! direct instruction, not statistical evidence, so matches are written as
//! confidence-1.0 behavior overrides that take effect before the next
//! nightly reflection.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::info;

use crate::error::NudgeResult;
use crate::store::ProactiveStore;
use crate::types::{
    BehaviorKey, Category, CategorySuppression, SuppressionEntry, SuppressionReason, UserBehavior,
};

/// One parsed meta-feedback instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaDirective {
    SuppressCategory(Category),
    BoostCategory(Category),
    PreferShortMessages,
    PreferTimeOfDay(String),
    AvoidTimeOfDay(String),
}

static CATEGORY_WORDS: &[(&str, Category)] = &[
    ("wellbeing", Category::Wellbeing),
    ("check-in", Category::Wellbeing),
    ("check in", Category::Wellbeing),
    ("reminder", Category::TaskReminder),
    ("deadline", Category::DeadlineWarning),
    ("briefing", Category::Briefing),
    ("schedule", Category::ScheduleInfo),
    ("habit", Category::Habit),
    ("grade", Category::GradeAlert),
    ("email", Category::EmailAlert),
    ("social", Category::Social),
    ("nudge", Category::Nudge),
    ("memory", Category::MemoryRecall),
];

static SUPPRESS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(stop sending( me)?|no more|don't send( me)?|fewer)\b(?P<rest>.{0,60})")
        .unwrap()
});

static BOOST_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(love|really like|keep sending|keep)\b(?P<rest>.{0,60})").unwrap());

static HELPFUL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?P<rest>.{0,60})\b(are|is) (really )?(helpful|great|useful)\b").unwrap());

static SHORT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(keep it short(er)?|shorter messages|be brief|too long)\b").unwrap()
});

static PREFER_TIME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(message me|text me|send( them)?)( only)? in the (?P<when>morning|afternoon|evening)\b")
        .unwrap()
});

static AVOID_TIME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(don't|do not|stop|no)\b.{0,30}\bin the (?P<when>morning|afternoon|evening)\b")
        .unwrap()
});

fn category_in(text: &str) -> Option<Category> {
    let lowered = text.to_lowercase();
    CATEGORY_WORDS
        .iter()
        .find(|(word, _)| lowered.contains(word))
        .map(|(_, category)| *category)
}

/// Parses free text against the fixed meta-feedback pattern table.
#[derive(Debug, Default)]
pub struct MetaFeedbackDetector;

impl MetaFeedbackDetector {
    pub fn new() -> Self {
        Self
    }

    /// Extract any directives the text carries.
    pub fn detect(&self, text: &str) -> Vec<MetaDirective> {
        let mut directives = Vec::new();

        // Time preferences first: "don't message me in the morning" must
        // not read as a plain suppression.
        if let Some(cap) = AVOID_TIME_PATTERN.captures(text) {
            directives.push(MetaDirective::AvoidTimeOfDay(cap["when"].to_lowercase()));
        } else if let Some(cap) = PREFER_TIME_PATTERN.captures(text) {
            directives.push(MetaDirective::PreferTimeOfDay(cap["when"].to_lowercase()));
        }

        if directives.is_empty() {
            if let Some(cap) = SUPPRESS_PATTERN.captures(text) {
                if let Some(category) = category_in(&cap["rest"]) {
                    directives.push(MetaDirective::SuppressCategory(category));
                }
            }
        }

        if let Some(category) = HELPFUL_PATTERN
            .captures(text)
            .and_then(|cap| category_in(&cap["rest"]))
            .or_else(|| {
                BOOST_PATTERN
                    .captures(text)
                    .and_then(|cap| category_in(&cap["rest"]))
            })
        {
            // A boost and a suppression of the same category cannot both
            // come from one utterance; suppression already claimed it.
            if !directives
                .iter()
                .any(|d| matches!(d, MetaDirective::SuppressCategory(c) if *c == category))
            {
                directives.push(MetaDirective::BoostCategory(category));
            }
        }

        if SHORT_PATTERN.is_match(text) {
            directives.push(MetaDirective::PreferShortMessages);
        }

        directives
    }

    /// Detect and immediately persist directives as explicit behaviors.
    pub fn apply(
        &self,
        store: &dyn ProactiveStore,
        user_id: &str,
        text: &str,
    ) -> NudgeResult<Vec<MetaDirective>> {
        let directives = self.detect(text);
        for directive in &directives {
            info!(user_id, ?directive, "meta-feedback applied");
            match directive {
                MetaDirective::SuppressCategory(category) => {
                    let mut suppression: CategorySuppression = store
                        .get_behavior(user_id, BehaviorKey::CategorySuppression)?
                        .and_then(|b| serde_json::from_value(b.value).ok())
                        .unwrap_or_default();
                    if !suppression.contains(*category) {
                        suppression.suppressed.push(SuppressionEntry {
                            category: *category,
                            reason: SuppressionReason::ExplicitStop,
                            since: chrono::Utc::now(),
                            probation_until: None,
                        });
                    }
                    store.put_behavior(&UserBehavior::explicit(
                        user_id,
                        BehaviorKey::CategorySuppression,
                        serde_json::to_value(&suppression)?,
                    ))?;
                }
                MetaDirective::BoostCategory(category) => {
                    store.put_behavior(&UserBehavior::explicit(
                        user_id,
                        BehaviorKey::MetaCategoryBoost,
                        json!({ "category": category.to_string() }),
                    ))?;
                }
                MetaDirective::PreferShortMessages => {
                    store.put_behavior(&UserBehavior::explicit(
                        user_id,
                        BehaviorKey::MetaFormatPreference,
                        json!({ "length": "short" }),
                    ))?;
                }
                MetaDirective::PreferTimeOfDay(when) => {
                    store.put_behavior(&UserBehavior::explicit(
                        user_id,
                        BehaviorKey::MetaTimePreference,
                        json!({ "prefer": when }),
                    ))?;
                }
                MetaDirective::AvoidTimeOfDay(when) => {
                    store.put_behavior(&UserBehavior::explicit(
                        user_id,
                        BehaviorKey::MetaTimePreference,
                        json!({ "avoid": when }),
                    ))?;
                }
            }
        }
        Ok(directives)
    }
}
