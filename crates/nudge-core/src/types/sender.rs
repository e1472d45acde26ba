//! Delivery format types shared between the sender and feedback records.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Wire format of an outbound message.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageFormat {
    #[default]
    Text,
    Button,
    List,
    CtaUrl,
}

impl MessageFormat {
    /// Hard length cap for the message body in this format.
    pub fn body_limit(self) -> usize {
        match self {
            MessageFormat::Text => 4096,
            MessageFormat::Button | MessageFormat::CtaUrl => 1024,
            MessageFormat::List => 1024,
        }
    }

    /// Maximum rows for list delivery.
    pub const LIST_MAX_ROWS: usize = 10;
    /// Maximum characters per list row title.
    pub const LIST_ROW_TITLE_LIMIT: usize = 24;
    /// Maximum buttons on a button message.
    pub const MAX_BUTTONS: usize = 3;
}

/// A message rendered for a concrete format, ready for the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub format: MessageFormat,
    pub body: String,
    /// Button labels for `Button` delivery.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<String>,
    /// Row titles for `List` delivery.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<String>,
    /// Target URL for `CtaUrl` delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl RenderedMessage {
    /// A plain text message.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            format: MessageFormat::Text,
            body: body.into(),
            buttons: Vec::new(),
            rows: Vec::new(),
            url: None,
        }
    }
}
