//! Error types for nudge operations.
//!
//! This module provides a structured error hierarchy with error codes for
//! programmatic handling. The proactive loop cares most about the failure
//! class: integration gaps return empty data, transient faults abandon the
//! current user's cycle, delivery faults are recorded against the feedback
//! record, and malformed generator output degrades to zero candidates.

use thiserror::Error;

/// Result type alias for nudge operations.
pub type NudgeResult<T> = Result<T, NudgeError>;

/// Main error type for all nudge operations.
#[derive(Error, Debug)]
pub enum NudgeError {
    /// An upstream integration is not linked for this user.
    ///
    /// Collectors translate this into an empty signal list; it never aborts
    /// a cycle.
    #[error("Integration unavailable: {integration}")]
    IntegrationUnavailable { integration: String },

    /// Timeout or 5xx from an external call. The current user's cycle is
    /// abandoned; the next scheduled tick retries naturally.
    #[error("Transient failure: {message}")]
    Transient {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The delivery channel rejected a message.
    #[error("Delivery failure: {message}")]
    Delivery {
        message: String,
        code: ErrorCode,
        /// Whether the channel flagged the failure as retryable.
        retryable: bool,
    },

    /// The candidate source returned data we could not parse. Treated as
    /// zero candidates by the caller.
    #[error("Malformed candidate output: {message}")]
    MalformedOutput { message: String },

    /// A deferred send aged out or its deadline passed before delivery.
    #[error("Stale candidate: {message}")]
    StaleCandidate { message: String },

    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        suggestion: Option<String>,
    },

    /// Record not found.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
    },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Scheduler error.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        code: ErrorCode,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,
    ValMissingField,
    ValInvalidFormat,

    // Records (REC_xxx)
    RecNotFound,

    // Network (NET_xxx)
    NetTimeout,
    NetConnectionFailed,

    // Delivery (DLV_xxx)
    DlvRejected,
    DlvUnsupportedFormat,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,

    // Parse (PARSE_xxx)
    ParseInvalidJson,
    ParseMissingField,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValMissingField => "VAL_002",
            ErrorCode::ValInvalidFormat => "VAL_003",
            ErrorCode::RecNotFound => "REC_001",
            ErrorCode::NetTimeout => "NET_001",
            ErrorCode::NetConnectionFailed => "NET_002",
            ErrorCode::DlvRejected => "DLV_001",
            ErrorCode::DlvUnsupportedFormat => "DLV_002",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::ParseMissingField => "PARSE_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl NudgeError {
    /// Create an integration-unavailable error.
    pub fn integration_unavailable(integration: impl Into<String>) -> Self {
        Self::IntegrationUnavailable {
            integration: integration.into(),
        }
    }

    /// Create a transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            code: ErrorCode::NetConnectionFailed,
            source: None,
        }
    }

    /// Create a transient timeout failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            code: ErrorCode::NetTimeout,
            source: None,
        }
    }

    /// Create a delivery failure.
    pub fn delivery(message: impl Into<String>, retryable: bool) -> Self {
        Self::Delivery {
            message: message.into(),
            code: ErrorCode::DlvRejected,
            retryable,
        }
    }

    /// Create an unsupported-format delivery failure.
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
            code: ErrorCode::DlvUnsupportedFormat,
            retryable: true,
        }
    }

    /// Create a malformed-output error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput {
            message: message.into(),
        }
    }

    /// Create a stale-candidate error.
    pub fn stale(message: impl Into<String>) -> Self {
        Self::StaleCandidate {
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: None,
        }
    }

    /// Create a validation error with suggestion.
    pub fn validation_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            code: ErrorCode::RecNotFound,
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidJson,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transient { code, .. } => *code,
            Self::Delivery { code, .. } => *code,
            Self::Validation { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::Database { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether this failure should abandon the current user's cycle only,
    /// leaving the retry to the next scheduled tick.
    pub fn abandons_cycle(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Database { .. })
    }
}

impl From<rusqlite::Error> for NudgeError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}

impl From<reqwest::Error> for NudgeError {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            ErrorCode::NetTimeout
        } else {
            ErrorCode::NetConnectionFailed
        };
        Self::Transient {
            message: err.to_string(),
            code,
            source: Some(Box::new(err)),
        }
    }
}
