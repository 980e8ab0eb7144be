//! Error types for indirection operations

use crate::Operation;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or INDIRECTOR_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file: {reason}")]
    Io { reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Missing required setting: {name}")]
    MissingSetting { name: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown terminus class '{class}' for indirection {indirection}")]
    UnknownTerminus { indirection: String, class: String },
}

/// Payload format errors raised while rendering or converting a model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("Unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },

    #[error("Could not encode as {content_type}: {reason}")]
    Encode { content_type: String, reason: String },

    #[error("Could not decode {content_type}: {reason}")]
    Decode { content_type: String, reason: String },
}

/// Persistent-store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Transaction failed for {kind}/{key}: {reason}")]
    TransactionFailed {
        kind: String,
        key: String,
        reason: String,
    },

    #[error("Stored rows for {kind}/{key} could not be rebuilt: {reason}")]
    Corrupt {
        kind: String,
        key: String,
        reason: String,
    },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// A non-2xx, non-404 response from a REST backend.
///
/// Carries everything a caller needs to decide on a retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Server returned {status}: {message}")]
pub struct RemoteError {
    pub status: u16,
    pub message: String,
    pub url: String,
    pub body: String,
}

impl RemoteError {
    /// Statuses worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self.status, 408 | 429 | 500 | 502 | 503 | 504)
    }
}

/// Master error type for indirection operations.
#[derive(Debug, Clone, Error)]
pub enum IndirectorError {
    #[error("No indirection registered for {name}")]
    NotFound { name: String },

    #[error("Indirection {name} holds {actual} payloads, not {requested}")]
    KindMismatch {
        name: String,
        requested: &'static str,
        actual: &'static str,
    },

    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("No content type in http response (status {status}); cannot parse")]
    MissingContentType { status: u16 },

    #[error("Could not deserialize {content_type} response: {reason}")]
    Deserialization {
        content_type: String,
        reason: String,
    },

    #[error("Could not serialize {content_type} payload: {reason}")]
    Serialization {
        content_type: String,
        reason: String,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Transport error talking to {target}: {reason}")]
    Transport {
        target: String,
        reason: String,
        timed_out: bool,
    },

    #[error("Terminus {terminus} does not support {operation}")]
    UnsupportedOperation {
        terminus: String,
        operation: Operation,
    },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl IndirectorError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn unsupported(terminus: impl Into<String>, operation: Operation) -> Self {
        Self::UnsupportedOperation {
            terminus: terminus.into(),
            operation,
        }
    }

    /// Whether a caller-side retry could succeed.
    ///
    /// Only connection-level failures and a fixed set of transient remote
    /// statuses qualify. Local contract violations and protocol errors never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Remote(remote) => remote.is_transient(),
            _ => false,
        }
    }

    /// The remote status, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote(remote) => Some(remote.status),
            Self::MissingContentType { status } => Some(*status),
            _ => None,
        }
    }
}

impl From<FormatError> for IndirectorError {
    fn from(err: FormatError) -> Self {
        match err {
            FormatError::Encode {
                content_type,
                reason,
            } => Self::Serialization {
                content_type,
                reason,
            },
            FormatError::Decode {
                content_type,
                reason,
            } => Self::Deserialization {
                content_type,
                reason,
            },
            FormatError::UnsupportedContentType { content_type } => Self::Deserialization {
                reason: format!("unsupported content type {}", content_type),
                content_type,
            },
        }
    }
}

/// Result type alias for indirection operations.
pub type IndirectorResult<T> = Result<T, IndirectorError>;

// =============================================================================
// TESTS
// =============================================================================
