//! Error taxonomy
//!
//! Every failure that leaves the router is one of four kinds. The kind
//! decides whether the retry executor may try again; the message is carried
//! through retries unchanged.
//!
//! | Kind                   | Code                   | Retryable        |
//! |------------------------|------------------------|------------------|
//! | `InvalidRequest`       | `INVALID_REQUEST`      | no               |
//! | `ProviderUnavailable`  | `PROVIDER_UNAVAILABLE` | yes              |
//! | `Timeout`              | `TIMEOUT`              | yes              |
//! | `Backend`              | `UNKNOWN_ERROR`        | backend decides  |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T, E = RouterError> = std::result::Result<T, E>;

/// Coarse classification of a [`RouterError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The caller sent something unusable
    InvalidRequest,
    /// No backend could serve the request
    ProviderUnavailable,
    /// A deadline expired
    Timeout,
    /// Any other backend failure
    UnknownError,
}

impl ErrorKind {
    /// Stable error code string
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Typed error returned by every router operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// Request failed validation or named an unknown model
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Backend unregistered or unreachable
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Deadline exceeded
    #[error("timeout: {0}")]
    Timeout(String),

    /// Backend-reported failure; the adapter decides retryability
    #[error("backend error: {message}")]
    Backend {
        /// Backend-supplied message
        message: String,
        /// Whether another attempt may succeed
        retryable: bool,
    },
}

impl RouterError {
    /// Shorthand for an `InvalidRequest` error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Shorthand for a `ProviderUnavailable` error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable(message.into())
    }

    /// Shorthand for a `Timeout` error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Shorthand for a `Backend` error
    pub fn backend(message: impl Into<String>, retryable: bool) -> Self {
        Self::Backend {
            message: message.into(),
            retryable,
        }
    }

    /// Classification of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Backend { .. } => ErrorKind::UnknownError,
        }
    }

    /// Stable error code string
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Whether the retry executor may try the operation again
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidRequest(_) => false,
            Self::ProviderUnavailable(_) | Self::Timeout(_) => true,
            Self::Backend { retryable, .. } => *retryable,
        }
    }

    /// The message without the kind prefix
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidRequest(m) | Self::ProviderUnavailable(m) | Self::Timeout(m) => m,
            Self::Backend { message, .. } => message,
        }
    }
}

impl From<reqwest::Error> for RouterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::ProviderUnavailable(err.to_string())
        } else if err.is_decode() {
            Self::backend(err.to_string(), false)
        } else {
            Self::backend(err.to_string(), true)
        }
    }
}
