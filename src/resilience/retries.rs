//! Retry policy and failure classification.
//!
//! # Design Decisions
//! - Connection errors, timeouts, 5xx and 429 are retryable
//! - Other 4xx and undecodable bodies are final
//! - 401 is final and ends the session
//! - Only transport-level trouble counts against an endpoint's breaker;
//!   a 4xx proves the endpoint is alive

use std::time::Duration;
use reqwest::StatusCode;

use crate::config::RetryConfig;
use crate::resilience::backoff::backoff_for;

/// How an attempt's failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Try again after backoff.
    Retryable,
    /// Give up immediately.
    Final,
    /// Give up immediately and end the session.
    Unauthorized,
}

/// Classify an HTTP status that is not a success.
pub fn classify_status(status: StatusCode) -> FailureClass {
    if status == StatusCode::UNAUTHORIZED {
        FailureClass::Unauthorized
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        FailureClass::Retryable
    } else {
        FailureClass::Final
    }
}

/// True if a response with this status should count as an endpoint failure.
pub fn is_endpoint_failure(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Retry budget for a single logical call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            config,
        }
    }

    /// Same delays, different budget.
    pub fn with_max_retries(&self, max_retries: u32) -> Self {
        Self {
            max_retries,
            config: self.config.clone(),
        }
    }

    /// `retries_done` counts retries already performed.
    pub fn should_retry(&self, class: FailureClass, retries_done: u32) -> bool {
        class == FailureClass::Retryable && retries_done < self.max_retries
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        backoff_for(&self.config, retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(StatusCode::INTERNAL_SERVER_ERROR), FailureClass::Retryable);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), FailureClass::Retryable);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), FailureClass::Retryable);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), FailureClass::Final);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), FailureClass::Final);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), FailureClass::Final);
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), FailureClass::Unauthorized);
    }

    #[test]
    fn test_budget_is_respected() {
        let policy = RetryPolicy::new(RetryConfig { max_retries: 2, ..RetryConfig::default() });
        assert!(policy.should_retry(FailureClass::Retryable, 0));
        assert!(policy.should_retry(FailureClass::Retryable, 1));
        assert!(!policy.should_retry(FailureClass::Retryable, 2));
        assert!(!policy.should_retry(FailureClass::Final, 0));
        assert!(!policy.should_retry(FailureClass::Unauthorized, 0));

        let none = policy.with_max_retries(0);
        assert!(!none.should_retry(FailureClass::Retryable, 0));
    }

    #[test]
    fn test_endpoint_failure_excludes_client_errors() {
        assert!(is_endpoint_failure(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_endpoint_failure(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_endpoint_failure(StatusCode::NOT_FOUND));
        assert!(!is_endpoint_failure(StatusCode::UNAUTHORIZED));
    }
}
