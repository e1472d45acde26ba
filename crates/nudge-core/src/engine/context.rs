//! Per-cycle context assembly.
//!
//! The context handed to the candidate source is built once per cycle from
//! persisted state and passed by reference through the stages; no stage
//! mutates it.

use serde_json::{json, Value};

use crate::error::NudgeResult;
use crate::pipeline::prefilter::PrefilterPass;
use crate::store::ProactiveStore;
use crate::traits::CandidateContext;
use crate::types::BehaviorKey;

/// Build the candidate-source context from a prefilter pass.
pub fn build_candidate_context(
    store: &dyn ProactiveStore,
    user_id: &str,
    pass: &PrefilterPass,
) -> NudgeResult<CandidateContext> {
    Ok(CandidateContext {
        user_id: user_id.to_string(),
        signals: pass.signals.clone(),
        trust: pass.trust.clone(),
        suppressed_categories: pass.suppressed.clone(),
        preferences: assemble_preferences(store, user_id)?,
    })
}

/// Collect the learned preferences worth conditioning generation on.
///
/// Only behaviors that exist are included; a brand-new user gets an empty
/// object.
pub fn assemble_preferences(store: &dyn ProactiveStore, user_id: &str) -> NudgeResult<Value> {
    let mut preferences = serde_json::Map::new();

    let keys = [
        ("category_preferences", BehaviorKey::CategoryPreferences),
        ("preferred_format", BehaviorKey::PreferredFormat),
        ("message_length", BehaviorKey::MessageLength),
        ("language_register", BehaviorKey::LanguageRegister),
        ("category_boost", BehaviorKey::MetaCategoryBoost),
        ("format_preference", BehaviorKey::MetaFormatPreference),
        ("time_preference", BehaviorKey::MetaTimePreference),
    ];

    for (name, key) in keys {
        if let Some(behavior) = store.get_behavior(user_id, key)? {
            preferences.insert(
                name.to_string(),
                json!({
                    "value": behavior.value,
                    "confidence": behavior.confidence,
                }),
            );
        }
    }

    Ok(Value::Object(preferences))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{TrustInfo, TrustLevel, UserBehavior};

    #[test]
    fn test_empty_preferences_for_new_user() {
        let store = SqliteStore::in_memory().unwrap();
        let preferences = assemble_preferences(&store, "ghost").unwrap();
        assert_eq!(preferences, json!({}));
    }

    #[test]
    fn test_preferences_include_stored_behaviors() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .put_behavior(&UserBehavior::explicit(
                "user-1",
                BehaviorKey::MetaFormatPreference,
                json!({"length": "short"}),
            ))
            .unwrap();

        let preferences = assemble_preferences(&store, "user-1").unwrap();
        assert_eq!(
            preferences["format_preference"]["value"]["length"],
            "short"
        );
        assert_eq!(preferences["format_preference"]["confidence"], 1.0);
    }

    #[test]
    fn test_context_carries_pass_through() {
        let store = SqliteStore::in_memory().unwrap();
        let pass = PrefilterPass {
            signals: Vec::new(),
            trust: TrustInfo::for_level(TrustLevel::Building, 20, 50),
            suppressed: vec![crate::types::Category::Wellbeing],
        };
        let context = build_candidate_context(&store, "user-1", &pass).unwrap();
        assert_eq!(context.user_id, "user-1");
        assert_eq!(context.trust.level, TrustLevel::Building);
        assert_eq!(
            context.suppressed_categories,
            vec![crate::types::Category::Wellbeing]
        );
    }
}
