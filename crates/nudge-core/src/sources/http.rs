//! HTTP-backed candidate source client.
//!
//! Posts the assembled cycle context to a generation service and parses the
//! returned candidate list. Malformed bodies degrade to zero candidates;
//! timeouts and 5xx responses surface as transient failures that abandon
//! only the current user's cycle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{NudgeError, NudgeResult};
use crate::traits::{CandidateContext, CandidateSource};
use crate::types::Candidate;

/// Configuration for the HTTP candidate source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpCandidateSourceConfig {
    /// Base URL of the generation service.
    pub base_url: String,
    /// Bearer token, if the service requires one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Candidate source over HTTP.
pub struct HttpCandidateSource {
    client: Client,
    base_url: String,
    api_key: Option<Secret<String>>,
}

impl HttpCandidateSource {
    /// Build the client. Fails only on TLS/runtime setup problems.
    pub fn new(config: HttpCandidateSourceConfig) -> NudgeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NudgeError::internal(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.map(Secret::new),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/candidates", self.base_url)
    }
}

#[async_trait]
impl CandidateSource for HttpCandidateSource {
    async fn generate(&self, context: &CandidateContext) -> NudgeResult<Vec<Candidate>> {
        let mut request = self.client.post(self.endpoint()).json(context);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(NudgeError::transient(format!(
                "candidate source returned {}",
                status
            )));
        }
        if !status.is_success() {
            // A client error means our request shape is off; nothing a
            // retry this cycle would fix. Treat as zero candidates.
            warn!(user_id = %context.user_id, %status, "candidate source rejected request");
            return Ok(Vec::new());
        }

        let body = response.text().await?;
        Ok(parse_candidates(&context.user_id, &body))
    }
}

/// Parse a response body, tolerating malformed entries.
///
/// The body may be a bare array or `{"candidates": [...]}`. Entries that do
/// not deserialize are skipped with a warning; a body that parses to
/// neither shape is zero candidates.
fn parse_candidates(user_id: &str, body: &str) -> Vec<Candidate> {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            warn!(user_id, error = %e, "candidate source returned unparseable body");
            return Vec::new();
        }
    };

    let items = match &parsed {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("candidates").and_then(Value::as_array) {
            Some(items) => items.as_slice(),
            None => {
                warn!(user_id, "candidate source body has no candidate list");
                return Vec::new();
            }
        },
        _ => {
            warn!(user_id, "candidate source body has unexpected shape");
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                warn!(user_id, error = %e, "skipping malformed candidate");
                None
            }
        })
        .collect()
}
