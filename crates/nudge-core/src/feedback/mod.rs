//! Outcome classification for proactive sends.

pub mod meta;
pub mod tracker;

pub use meta::{MetaDirective, MetaFeedbackDetector};
pub use tracker::{FeedbackTracker, ENGAGEMENT_TIMEOUT_MINUTES};
