//! The staged decision pipeline.
//!
//! Stages run in a fixed order each cycle: dedup, enrichment, trust,
//! prefilter, candidate scoring, send. Dedup through scoring are pure
//! computation over loaded state; only the edges do I/O.

pub mod dedup;
pub mod enrich;
pub mod prefilter;
pub mod rules;
pub mod sender;
pub mod trust;

pub use dedup::Deduplicator;
pub use enrich::Enricher;
pub use prefilter::{BlockReason, Prefilter, PrefilterOutcome};
pub use rules::{Rules, RulesVerdict};
pub use sender::{ContentValidator, Sender};
pub use trust::TrustModel;
