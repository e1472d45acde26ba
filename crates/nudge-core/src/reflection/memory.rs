//! Memory upkeep: fact decay, pruning, and entity merging.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::NudgeResult;
use crate::store::ProactiveStore;
use crate::types::UserFact;

/// Days without a reference before confidence starts decaying.
pub const DECAY_AFTER_DAYS: i64 = 14;
/// Multiplier applied to confidence on each decay pass.
pub const DECAY_FACTOR: f64 = 0.9;
/// Confidence floor below which old facts are pruned.
pub const PRUNE_CONFIDENCE: f64 = 0.2;
/// Minimum age before a low-confidence fact may be pruned.
pub const PRUNE_AFTER_DAYS: i64 = 30;

/// Result counts from one upkeep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpkeepResult {
    pub decayed: usize,
    pub pruned: usize,
    pub merged: usize,
}

/// Run decay, pruning, and entity merging for one user's facts.
pub fn run_upkeep(
    store: &dyn ProactiveStore,
    user_id: &str,
    now: DateTime<Utc>,
) -> NudgeResult<UpkeepResult> {
    let mut result = UpkeepResult::default();
    let facts = store.facts_for(user_id)?;

    // Decay then prune.
    let mut survivors: Vec<UserFact> = Vec::with_capacity(facts.len());
    for mut fact in facts {
        let unreferenced_days = (now - fact.last_referenced).num_days();
        if unreferenced_days >= DECAY_AFTER_DAYS {
            fact.confidence *= DECAY_FACTOR;
            store.update_fact(&fact)?;
            result.decayed += 1;
        }

        let age_days = (now - fact.created_at).num_days();
        if fact.confidence < PRUNE_CONFIDENCE && age_days >= PRUNE_AFTER_DAYS {
            store.delete_fact(fact.id)?;
            result.pruned += 1;
        } else {
            survivors.push(fact);
        }
    }

    // Merge duplicate entities by substring-normalized name: "lena" and
    // "Lena Müller" describe the same person; the more specific (longer)
    // name survives.
    let mut entity_facts: Vec<&UserFact> = survivors
        .iter()
        .filter(|f| f.entity.is_some())
        .collect();
    entity_facts.sort_by_key(|f| std::cmp::Reverse(normalize(f.entity.as_deref().unwrap()).len()));

    let mut absorbed: Vec<uuid::Uuid> = Vec::new();
    for i in 0..entity_facts.len() {
        if absorbed.contains(&entity_facts[i].id) {
            continue;
        }
        let keeper_name = normalize(entity_facts[i].entity.as_deref().unwrap());
        let mut keeper = entity_facts[i].clone();
        let mut changed = false;
        for other in entity_facts.iter().skip(i + 1) {
            if absorbed.contains(&other.id) {
                continue;
            }
            let other_name = normalize(other.entity.as_deref().unwrap());
            if other_name.is_empty() || !keeper_name.contains(&other_name) {
                continue;
            }
            // Fold the duplicate's content into the keeper.
            if !keeper.content.contains(&other.content) {
                keeper.content = format!("{}; {}", keeper.content, other.content);
            }
            keeper.confidence = keeper.confidence.max(other.confidence);
            keeper.last_referenced = keeper.last_referenced.max(other.last_referenced);
            store.delete_fact(other.id)?;
            absorbed.push(other.id);
            changed = true;
            result.merged += 1;
            debug!(user_id, entity = %other_name, "duplicate entity merged");
        }
        if changed {
            store.update_fact(&keeper)?;
        }
    }

    Ok(result)
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
