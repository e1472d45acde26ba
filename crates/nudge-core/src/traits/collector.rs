//! Signal collector seam.

use async_trait::async_trait;

use crate::types::Signal;

/// One collector per upstream domain (calendar, coursework, email, internal).
///
/// Collectors must never raise: integration absence or upstream failure is
/// logged inside the collector and surfaces as an empty list, so sibling
/// collectors are never blocked.
#[async_trait]
pub trait SignalCollector: Send + Sync {
    /// Human-readable collector name, used in logs.
    fn name(&self) -> &str;

    /// Collect the current signals for a user. Infallible by contract.
    async fn collect(&self, user_id: &str) -> Vec<Signal>;
}
