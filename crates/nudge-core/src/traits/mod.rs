//! Trait seams for external collaborators.

pub mod collector;
pub mod delivery;
pub mod source;

pub use collector::SignalCollector;
pub use delivery::{DeliveryChannel, DeliveryReceipt};
pub use source::{CandidateContext, CandidateSource};
