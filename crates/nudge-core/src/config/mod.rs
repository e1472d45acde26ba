//! Configuration system for nudge.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{NudgeError, NudgeResult};
use crate::pipeline::rules::RulesConfig;
use crate::sources::HttpCandidateSourceConfig;

/// Main engine configuration.
///
/// Job cadences are operational values, not derivable from the algorithm;
/// everything ships with conservative defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the engine database.
    pub db_path: PathBuf,
    /// Main per-user loop interval, in seconds.
    pub loop_interval_secs: u64,
    /// Deferred-send sweep interval, in seconds.
    pub deferred_sweep_secs: u64,
    /// Cron expression (with seconds field) for the nightly reflection run.
    pub reflection_cron: String,
    /// Minimum gap between proactive sends to one user, in minutes.
    pub cooldown_minutes: i64,
    /// Age past which a queued deferred send expires, in hours.
    pub deferred_max_age_hours: i64,
    /// Timeout for one candidate-generation call, in seconds.
    pub generation_timeout_secs: u64,
    /// Timeout for one delivery call, in seconds.
    pub delivery_timeout_secs: u64,
    /// How far back the recent-assistant-message dedup looks, in hours.
    pub recent_message_window_hours: i64,
    /// Candidate selection tunables.
    pub rules: RulesConfig,
    /// HTTP candidate source, if generation runs out of process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_source: Option<HttpCandidateSourceConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let nudge_dir = dirs::home_dir()
            .map(|h| h.join(".nudge"))
            .unwrap_or_else(|| PathBuf::from(".nudge"));

        Self {
            db_path: nudge_dir.join("nudge.db"),
            loop_interval_secs: 300,
            deferred_sweep_secs: 60,
            reflection_cron: "0 10 3 * * *".to_string(),
            cooldown_minutes: 30,
            deferred_max_age_hours: 12,
            generation_timeout_secs: 30,
            delivery_timeout_secs: 15,
            recent_message_window_hours: 48,
            rules: RulesConfig::default(),
            candidate_source: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> NudgeResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| NudgeError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| NudgeError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| NudgeError::Configuration(e.to_string()))?,
            _ => {
                return Err(NudgeError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("NUDGE_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(secs) = std::env::var("NUDGE_LOOP_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                config.loop_interval_secs = secs;
            }
        }
        if let Ok(base_url) = std::env::var("NUDGE_CANDIDATE_URL") {
            config.candidate_source = Some(HttpCandidateSourceConfig {
                base_url,
                api_key: std::env::var("NUDGE_CANDIDATE_API_KEY").ok(),
                timeout_secs: config.generation_timeout_secs,
            });
        }

        config
    }

    /// Reject configurations the scheduler cannot run.
    pub fn validate(&self) -> NudgeResult<()> {
        if self.loop_interval_secs == 0 {
            return Err(NudgeError::Configuration(
                "loop_interval_secs must be positive".to_string(),
            ));
        }
        if self.deferred_sweep_secs == 0 {
            return Err(NudgeError::Configuration(
                "deferred_sweep_secs must be positive".to_string(),
            ));
        }
        if self.reflection_cron.trim().is_empty() {
            return Err(NudgeError::Configuration(
                "reflection_cron must be set".to_string(),
            ));
        }
        if self.cooldown_minutes < 0 {
            return Err(NudgeError::Configuration(
                "cooldown_minutes must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// Builder for EngineConfig.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the database path.
    pub fn db_path(mut self, path: PathBuf) -> Self {
        self.config.db_path = path;
        self
    }

    /// Set the main loop interval.
    pub fn loop_interval_secs(mut self, secs: u64) -> Self {
        self.config.loop_interval_secs = secs;
        self
    }

    /// Set the deferred sweep interval.
    pub fn deferred_sweep_secs(mut self, secs: u64) -> Self {
        self.config.deferred_sweep_secs = secs;
        self
    }

    /// Set the reflection cron expression.
    pub fn reflection_cron(mut self, cron: impl Into<String>) -> Self {
        self.config.reflection_cron = cron.into();
        self
    }

    /// Set the per-user cooldown.
    pub fn cooldown_minutes(mut self, minutes: i64) -> Self {
        self.config.cooldown_minutes = minutes;
        self
    }

    /// Set candidate selection tunables.
    pub fn rules(mut self, rules: RulesConfig) -> Self {
        self.config.rules = rules;
        self
    }

    /// Set the HTTP candidate source.
    pub fn candidate_source(mut self, source: HttpCandidateSourceConfig) -> Self {
        self.config.candidate_source = Some(source);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
