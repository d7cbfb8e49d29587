//! Error taxonomy shared by the executor and the API facade.

use thiserror::Error;

use crate::session::storage::StorageError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Every way a backend call can fail.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure (DNS, connection refused, reset).
    #[error("network error contacting {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    /// The attempt did not finish within its deadline.
    #[error("request to {endpoint} timed out after {timeout_ms} ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// Every endpoint's circuit is open.
    #[error("service unavailable: no endpoint is accepting requests, try again later")]
    ServiceUnavailable,

    /// Non-2xx response.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// 401, or no usable token for an authenticated call.
    #[error("authentication required: {0}")]
    Auth(String),

    /// Input rejected before any network call.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// 2xx body that does not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),
}

/// What the user interface should offer for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserHint {
    /// Transient; show a retry affordance.
    Retry,
    /// Prompt for login again.
    Reauthenticate,
    /// Show the message next to the offending input.
    FixInput,
    /// Nothing the user can do.
    Report,
}

impl ApiError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field,
            message: message.into(),
        }
    }

    /// True for errors the executor retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network { .. } | ApiError::Timeout { .. } => true,
            ApiError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    pub fn user_hint(&self) -> UserHint {
        match self {
            ApiError::Network { .. } | ApiError::Timeout { .. } | ApiError::ServiceUnavailable => {
                UserHint::Retry
            }
            ApiError::Http { .. } if self.is_retryable() => UserHint::Retry,
            ApiError::Auth(_) => UserHint::Reauthenticate,
            ApiError::Validation { .. } => UserHint::FixInput,
            _ => UserHint::Report,
        }
    }

    /// HTTP status, if the backend answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Auth(_) => Some(401),
            _ => None,
        }
    }
}
