//! Errors returned by the remote schema store

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::models::StoreErrorBody;
use super::resilience::RetryableError;

/// Failure of a single remote call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// Invalid or expired integration key
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Parent container not shared with the integration
    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed property schema or name collision
    #[error("schema rejected: {0}")]
    Validation(String),

    #[error("rate limited: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("network error: {0}")]
    Network(String),
}

/// Serializable tag of a [`StoreError`], as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    AuthError,
    PermissionError,
    NotFoundError,
    ValidationError,
    RateLimitError,
    NetworkError,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitError | Self::NetworkError)
    }

    /// One-line hint shown by the console entry point
    pub fn hint(&self) -> &'static str {
        match self {
            Self::AuthError => "check that the integration key is valid and not revoked",
            Self::PermissionError => "share the parent page with the integration and retry",
            Self::NotFoundError => "check the parent page id",
            Self::ValidationError => "the schema catalog was rejected by the store",
            Self::RateLimitError => "the store kept rate limiting; wait a minute and retry",
            Self::NetworkError => "the store was unreachable; retry when the connection is back",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AuthError => "AuthError",
            Self::PermissionError => "PermissionError",
            Self::NotFoundError => "NotFoundError",
            Self::ValidationError => "ValidationError",
            Self::RateLimitError => "RateLimitError",
            Self::NetworkError => "NetworkError",
        };
        f.write_str(name)
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::AuthError,
            Self::Permission(_) => ErrorKind::PermissionError,
            Self::NotFound(_) => ErrorKind::NotFoundError,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::RateLimit { .. } => ErrorKind::RateLimitError,
            Self::Network(_) => ErrorKind::NetworkError,
        }
    }

    /// Map a non-success HTTP response to an error kind
    pub fn from_response(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let parsed: Option<StoreErrorBody> = serde_json::from_str(body).ok();
        let code = parsed.as_ref().map(|b| b.code.as_str()).unwrap_or("");
        let message = match &parsed {
            Some(b) if !b.message.is_empty() => format!("{} ({})", b.message, b.code),
            _ if body.trim().is_empty() => format!("HTTP {}", status),
            _ => format!("HTTP {}: {}", status, body.trim()),
        };

        match (status, code) {
            (_, "unauthorized") | (401, _) => Self::Auth(message),
            (_, "restricted_resource") | (403, _) => Self::Permission(message),
            (_, "object_not_found") | (404, _) => Self::NotFound(message),
            (_, "rate_limited") | (429, _) => Self::RateLimit {
                message,
                retry_after,
            },
            (_, "conflict_error") => Self::Network(message),
            (400..=499, _) => Self::Validation(message),
            _ => Self::Network(message),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl RetryableError for StoreError {
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
