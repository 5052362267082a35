//! Errors returned by external commerce service clients.
//!
//! Tax, billing, shipping and email clients all fail through
//! [`PlatformError`]. Callers branch on [`PlatformError::is_retryable`]; the
//! clients themselves never retry.

use std::time::Duration;
use thiserror::Error;

/// Failure talking to an external commerce service.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// The request never produced a usable response
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not match the expected shape
    #[error("could not decode provider response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The service is down or overloaded
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Credentials were refused. The response body is dropped because
    /// services tend to echo the offending key.
    #[error("provider rejected credentials (status {status})")]
    Unauthorized {
        /// 401 or 403
        status: u16,
    },

    /// The addressed resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Too many requests
    #[error("provider rate limit exceeded")]
    RateLimited {
        /// Delay requested by the service, when it sent one
        retry_after: Option<Duration>,
    },

    /// The caller's request is unusable before anything is sent
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The service understood the request and refused it
    #[error("provider rejected request with status {status}: {message}")]
    Rejected {
        /// Status code or SMTP reply code
        status: u16,
        /// Response body or reply text
        message: String,
    },

    /// No response within the client's deadline
    #[error("provider call timed out: {0}")]
    Timeout(String),

    /// Response violated the client's expectations
    #[error("internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Whether the same call may succeed if repeated later.
    ///
    /// # Examples
    ///
    /// ```
    /// use commerce_common::PlatformError;
    ///
    /// assert!(PlatformError::RateLimited { retry_after: None }.is_retryable());
    /// assert!(!PlatformError::Unauthorized { status: 401 }.is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::RateLimited { .. } | Self::Timeout(_)
        )
    }

    /// Map a non-success HTTP status and body to an error.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            404 => Self::NotFound(body.into()),
            408 => Self::Timeout(body.into()),
            429 => Self::RateLimited { retry_after: None },
            500..=599 => Self::Unavailable(format!("status {status}: {}", body.into())),
            _ => Self::Rejected {
                status,
                message: body.into(),
            },
        }
    }

    /// Attach a `Retry-After` delay to a rate-limit error. Other variants are
    /// returned unchanged.
    #[must_use]
    pub fn with_retry_after(self, delay: Option<Duration>) -> Self {
        match self {
            Self::RateLimited { retry_after } => Self::RateLimited {
                retry_after: delay.or(retry_after),
            },
            other => other,
        }
    }

    /// Status code carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status } | Self::Rejected { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
