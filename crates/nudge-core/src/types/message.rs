//! Stored conversation messages.
//!
//! The engine keeps its own append-only log of both directions of the
//! conversation: reflection derives raw-activity behaviors from it, the
//! scorer dedups candidates against recent assistant messages, and the
//! feedback tracker measures reply latency with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Message direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One logged message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// True for assistant messages the proactive loop initiated.
    pub proactive: bool,
}

impl StoredMessage {
    /// Log a user-originated message.
    pub fn from_user(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            role: MessageRole::User,
            content: content.into(),
            created_at: Utc::now(),
            proactive: false,
        }
    }

    /// Log an assistant message.
    pub fn from_assistant(
        user_id: impl Into<String>,
        content: impl Into<String>,
        proactive: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            role: MessageRole::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            proactive,
        }
    }
}
