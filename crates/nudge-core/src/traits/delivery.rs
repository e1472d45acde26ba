//! Delivery channel seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NudgeResult;
use crate::types::{MessageFormat, RenderedMessage};

/// Result of a delivery attempt.
///
/// The engine interprets `fallback_format` as a hint to re-render once in
/// that format and retry; anything else fails the send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub success: bool,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_format: Option<MessageFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryReceipt {
    pub fn delivered() -> Self {
        Self {
            success: true,
            retryable: false,
            fallback_format: None,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            retryable,
            fallback_format: None,
            error: Some(error.into()),
        }
    }

    /// Rejection with a format fallback hint.
    pub fn unsupported_format(fallback: MessageFormat) -> Self {
        Self {
            success: false,
            retryable: true,
            fallback_format: Some(fallback),
            error: Some("unsupported format".to_string()),
        }
    }
}

/// Sends rendered messages to the user's chat channel.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Attempt delivery. Transport errors (timeouts, 5xx) are `Err`;
    /// channel-level rejection is an unsuccessful receipt.
    async fn send(&self, to: &str, message: &RenderedMessage) -> NudgeResult<DeliveryReceipt>;
}
