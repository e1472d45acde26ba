//! Candidate source seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NudgeResult;
use crate::types::{Candidate, Signal, TrustInfo};

/// Context assembled once per cycle and handed to the candidate source.
///
/// Built after the prefilter, so the source only ever sees signals that
/// already cleared the cheap gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateContext {
    pub user_id: String,
    pub signals: Vec<Signal>,
    pub trust: TrustInfo,
    /// Categories currently suppressed for this user, so the source can
    /// avoid wasting proposals on them.
    pub suppressed_categories: Vec<crate::types::Category>,
    /// Learned preferences worth conditioning generation on.
    pub preferences: serde_json::Value,
}

/// Produces scored message proposals for an assembled context.
///
/// An empty list is the statistically dominant, correct response: say
/// nothing unless something concrete and actionable exists. Implementations
/// must map malformed upstream output to an empty list, not an error.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Generate zero or more candidates for the context.
    async fn generate(&self, context: &CandidateContext) -> NudgeResult<Vec<Candidate>>;
}
