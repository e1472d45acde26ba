//! Delivery-format selection, content validation, and the send path.
//!
//! Sanitization is soft: a message that trips a content check is cleaned
//! and sent with warnings logged, never hard-rejected. The only retry the
//! send path performs is a single plain-text resend when the channel
//! rejects a richer format.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;
use url::Url;

use crate::error::{NudgeError, NudgeResult};
use crate::traits::DeliveryChannel;
use crate::types::{ActionKind, Candidate, Category, MessageFormat, RenderedMessage};

static MARKDOWN_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[^`]*```|```").unwrap());
static TABLE_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\|.*\|\s*$").unwrap());
static SIGNATURE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)\n\s*[—–-]\s*[A-Z][\w .]{0,30}\s*$").unwrap());
static BULLET_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[-*•]\s+(.+)$").unwrap());

static BANNED_PHRASES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "as an ai",
        "as a language model",
        "i am an ai",
        "i cannot help with",
    ]
});

static LEAK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)system prompt",
        r"(?i)\[inst\]",
        r"(?i)^instructions:",
        r"(?i)you are a helpful assistant",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Sanitized message content plus any soft warnings raised along the way.
#[derive(Debug, Clone)]
pub struct SanitizedContent {
    pub text: String,
    pub warnings: Vec<String>,
}

/// Validates and cleans outbound message text.
#[derive(Debug, Default)]
pub struct ContentValidator;

impl ContentValidator {
    pub fn new() -> Self {
        Self
    }

    /// Run the full validation pipeline for a format's length cap.
    pub fn sanitize(&self, text: &str, limit: usize) -> SanitizedContent {
        let mut warnings = Vec::new();

        let mut text = text.to_string();

        if MARKDOWN_HEADER.is_match(&text) || CODE_FENCE.is_match(&text) || TABLE_ROW.is_match(&text)
        {
            warnings.push("disallowed markdown stripped".to_string());
            text = MARKDOWN_HEADER.replace_all(&text, "").into_owned();
            text = CODE_FENCE.replace_all(&text, "").into_owned();
            text = TABLE_ROW.replace_all(&text, "").into_owned();
        }

        if SIGNATURE_LINE.is_match(&text) {
            warnings.push("trailing signature stripped".to_string());
            text = SIGNATURE_LINE.replace_all(&text, "").into_owned();
        }

        let (cleaned, removed) = cap_emoji(&text);
        if removed > 0 {
            warnings.push(format!("{} extra emoji removed", removed));
            text = cleaned;
        }

        let lowered = text.to_lowercase();
        for phrase in BANNED_PHRASES.iter() {
            if lowered.contains(phrase) {
                warnings.push(format!("banned phrase: {}", phrase));
            }
        }
        for pattern in LEAK_PATTERNS.iter() {
            if pattern.is_match(&text) {
                warnings.push(format!("possible prompt leakage: {}", pattern.as_str()));
            }
        }

        if text.chars().count() > limit {
            warnings.push("truncated to length cap".to_string());
            text = truncate_words(&text, limit);
        }

        SanitizedContent {
            text: text.trim().to_string(),
            warnings,
        }
    }
}

/// Keep the first emoji, drop the rest. Returns the cleaned text and how
/// many were removed.
fn cap_emoji(text: &str) -> (String, usize) {
    let mut seen = false;
    let mut removed = 0;
    let cleaned = text
        .chars()
        .filter(|c| {
            if is_emoji(*c) {
                if seen {
                    removed += 1;
                    return false;
                }
                seen = true;
            }
            true
        })
        .collect();
    (cleaned, removed)
}

fn is_emoji(c: char) -> bool {
    matches!(
        c,
        '\u{1F300}'..='\u{1FAFF}' | '\u{2600}'..='\u{27BF}' | '\u{1F000}'..='\u{1F0FF}'
    )
}

/// Truncate at a word boundary within `limit` chars, appending an ellipsis.
fn truncate_words(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let budget = limit.saturating_sub(1);
    let cut: String = text.chars().take(budget).collect();
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}…", trimmed.trim_end())
}

/// Pick the delivery format for a candidate.
///
/// A parseable link wins, a briefing-shaped body becomes a list, a button
/// prompt gets buttons, and everything else ships as plain text.
pub fn select_format(candidate: &Candidate) -> MessageFormat {
    if let Some(link) = &candidate.link {
        if is_valid_link(link) {
            return MessageFormat::CtaUrl;
        }
    }
    let bullet_count = BULLET_LINE.find_iter(&candidate.message).count();
    if candidate.category == Category::Briefing || bullet_count >= 4 {
        return MessageFormat::List;
    }
    if candidate.action_type == ActionKind::ButtonPrompt {
        return MessageFormat::Button;
    }
    MessageFormat::Text
}

fn is_valid_link(link: &str) -> bool {
    Url::parse(link)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Render a candidate into a concrete format, enforcing the format's
/// structural constraints. Returns `None` if the content cannot satisfy
/// them, in which case the caller falls back to text.
fn render(candidate: &Candidate, format: MessageFormat, content: &SanitizedContent) -> Option<RenderedMessage> {
    match format {
        MessageFormat::Text => Some(RenderedMessage::text(content.text.clone())),
        MessageFormat::Button => Some(RenderedMessage {
            format,
            body: content.text.clone(),
            buttons: vec!["Sounds good".to_string(), "Skip".to_string()],
            rows: Vec::new(),
            url: None,
        }),
        MessageFormat::CtaUrl => {
            let link = candidate.link.clone().filter(|l| is_valid_link(l))?;
            Some(RenderedMessage {
                format,
                body: content.text.clone(),
                buttons: Vec::new(),
                rows: Vec::new(),
                url: Some(link),
            })
        }
        MessageFormat::List => {
            let rows: Vec<String> = BULLET_LINE
                .captures_iter(&content.text)
                .take(MessageFormat::LIST_MAX_ROWS)
                .map(|cap| {
                    let row = cap[1].trim();
                    row.chars().take(MessageFormat::LIST_ROW_TITLE_LIMIT).collect()
                })
                .collect();
            if rows.is_empty() {
                return None;
            }
            let body = BULLET_LINE
                .replace_all(&content.text, "")
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            Some(RenderedMessage {
                format,
                body,
                buttons: Vec::new(),
                rows,
                url: None,
            })
        }
    }
}

/// Outcome of a successful send.
#[derive(Debug, Clone)]
pub struct SendResult {
    /// The format that actually went out (after any fallback).
    pub format: MessageFormat,
    /// The delivered body, for the conversation log.
    pub body: String,
    /// Soft validation warnings raised while preparing the content.
    pub warnings: Vec<String>,
}

/// The send path: select, validate, deliver, fall back once.
pub struct Sender {
    channel: Arc<dyn DeliveryChannel>,
    validator: ContentValidator,
}

impl Sender {
    pub fn new(channel: Arc<dyn DeliveryChannel>) -> Self {
        Self {
            channel,
            validator: ContentValidator::new(),
        }
    }

    /// Deliver the winning candidate to a user.
    pub async fn deliver(&self, user_id: &str, candidate: &Candidate) -> NudgeResult<SendResult> {
        let format = select_format(candidate);
        let content = self.validator.sanitize(&candidate.message, format.body_limit());
        for warning in &content.warnings {
            warn!(user_id, warning = %warning, "content validation");
        }

        let message = render(candidate, format, &content)
            .unwrap_or_else(|| RenderedMessage::text(content.text.clone()));
        let attempted_format = message.format;

        let receipt = self.channel.send(user_id, &message).await?;
        if receipt.success {
            return Ok(SendResult {
                format: attempted_format,
                body: message.body,
                warnings: content.warnings,
            });
        }

        // One fallback: honor the channel's format hint, or degrade to
        // plain text on an unsupported-format rejection.
        let fallback = receipt
            .fallback_format
            .or_else(|| (attempted_format != MessageFormat::Text).then_some(MessageFormat::Text));

        if let Some(fallback_format) = fallback {
            warn!(
                user_id,
                from = %attempted_format,
                to = %fallback_format,
                "delivery rejected, retrying with fallback format"
            );
            let content = self
                .validator
                .sanitize(&candidate.message, fallback_format.body_limit());
            let message = render(candidate, fallback_format, &content)
                .unwrap_or_else(|| RenderedMessage::text(content.text.clone()));
            let retry = self.channel.send(user_id, &message).await?;
            if retry.success {
                return Ok(SendResult {
                    format: message.format,
                    body: message.body,
                    warnings: content.warnings,
                });
            }
        }

        Err(NudgeError::delivery(
            receipt
                .error
                .unwrap_or_else(|| "channel rejected message".to_string()),
            receipt.retryable,
        ))
    }
}
