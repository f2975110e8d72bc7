//! Error types for aula-net

use thiserror::Error;

/// Result type alias using aula-net's error type
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors produced by the network layer
///
/// The taxonomy distinguishes transient failures (worth retrying) from
/// permanent ones, and gives queued requests their own terminal outcomes so
/// a caller can tell exhaustion apart from cancellation or an explicit clear.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetError {
    /// Transport-level connection failure (refused, reset, DNS, TLS)
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// A single attempt exceeded its deadline
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Non-2xx HTTP response
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Application-level rejection (validation, malformed payload)
    #[error("request rejected: {message}")]
    Invalid { message: String },

    /// Submitted while offline with queueing disabled
    #[error("offline and request queueing is disabled")]
    Offline,

    /// Aborted by its owner before completion
    #[error("request cancelled")]
    Cancelled,

    /// Pending queued request rejected by an explicit clear
    #[error("request queue cleared")]
    QueueCleared,

    /// Retry budget consumed while queued
    #[error("retry budget exhausted after {attempts} attempts")]
    QueueExhausted { attempts: u32 },

    /// Invalid policy or runtime configuration
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl NetError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Create an HTTP status error
    pub fn http(status: u16, url: impl Into<String>) -> Self {
        Self::Http {
            status,
            url: url.into(),
        }
    }

    /// Create an application-level rejection
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// HTTP status code carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            NetError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error is worth retrying
    ///
    /// Transient: connection failures, timeouts, and HTTP 5xx. Everything
    /// else (4xx, validation, cancellation, terminal queue outcomes) is
    /// permanent and must propagate on first occurrence.
    pub fn is_transient(&self) -> bool {
        match self {
            NetError::Connection { .. } | NetError::Timeout { .. } => true,
            NetError::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}
