//! nudge-core - Core library for nudge.
//!
//! This crate implements the proactive decision pipeline for an assistant
//! chat product: signal intake and deduplication, cross-signal enrichment,
//! trust and quiet-hour gating, candidate scoring and suppression, delivery
//! with format selection, outcome feedback classification, and the nightly
//! behavioral-model refresh.
//!
//! # Example
//!
//! ```ignore
//! use nudge_core::{EngineConfig, EngineScheduler, ProactiveEngine, SqliteStore};
//!
//! let store = Arc::new(SqliteStore::new(&config.db_path)?);
//! let engine = Arc::new(ProactiveEngine::new(config, store, collectors, source, channel));
//!
//! let scheduler = EngineScheduler::new(engine.clone()).await?;
//! scheduler.start().await?;
//!
//! // Reactive side: feed user messages in as they arrive.
//! engine.on_user_message("user-1", "thanks, that helped!").await?;
//! ```

pub mod collectors;
pub mod config;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod pipeline;
pub mod reflection;
pub mod sources;
pub mod store;
pub mod traits;
pub mod types;
pub mod util;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{CycleOutcome, EngineScheduler, LoopReport, ProactiveEngine};
pub use error::{ErrorCode, NudgeError, NudgeResult};
pub use feedback::FeedbackTracker;
pub use pipeline::{BlockReason, Deduplicator, Enricher, Prefilter, Rules, Sender, TrustModel};
pub use reflection::{ReflectionJob, ReflectionReport};
pub use sources::{HttpCandidateSource, HttpCandidateSourceConfig};
pub use store::{ProactiveStore, SqliteStore};
pub use traits::{
    CandidateContext, CandidateSource, DeliveryChannel, DeliveryReceipt, SignalCollector,
};
pub use types::{
    ActionKind, BehaviorKey, Candidate, Category, DeferredInsight, DeferredSend, FeedbackRecord,
    MessageFormat, Outcome, Signal, SignalState, SignalType, TrustInfo, TrustLevel, UserBehavior,
    UserProfile,
};
