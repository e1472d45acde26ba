//! Core data types for the proactive pipeline.

pub mod behavior;
pub mod candidate;
pub mod feedback;
pub mod message;
pub mod sender;
pub mod signal;
pub mod trust;
pub mod user;

pub use behavior::{
    confidence_from_samples, BehaviorKey, CategorySuppression, SuppressionEntry, SuppressionReason,
    UserBehavior,
};
pub use candidate::{
    ActionKind, Candidate, Category, DeferredInsight, DeferredSend, DeferredStatus,
};
pub use feedback::{DeliveryStatus, FeedbackRecord, Outcome, Sentiment};
pub use message::{MessageRole, StoredMessage};
pub use sender::{MessageFormat, RenderedMessage};
pub use signal::{derive_dedup_key, Signal, SignalSource, SignalState, SignalType};
pub use trust::{TrustInfo, TrustLevel};
pub use user::{UserFact, UserProfile};
