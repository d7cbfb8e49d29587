//! The resilient request executor.
//!
//! Every backend call goes through [`ResilientExecutor::execute`]:
//!
//! ```text
//! ApiCall
//!   → pick first ranked candidate the breaker admits (else ServiceUnavailable)
//!   → attach headers, send under a deadline
//!   → 2xx: record success, decode
//!   → failure: record on the breaker, classify
//!       Retryable + budget left → backoff, re-select endpoint, try again
//!       401                     → logout(SessionExpired), Auth
//!       otherwise               → return the error
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::config::{RetryConfig, TimeoutConfig};
use crate::error::{ApiError, ApiResult};
use crate::health::EndpointProber;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreakerRegistry;
use crate::resilience::retries::{classify_status, is_endpoint_failure, FailureClass, RetryPolicy};
use crate::resilience::timeouts::with_deadline;
use crate::session::store::{SessionEndReason, SessionStore, TokenUnavailable};

/// Header carrying the per-attempt correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// One logical backend call. `path` is relative to `/api`.
#[derive(Debug, Clone)]
pub struct ApiCall {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    auth: bool,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
}

impl ApiCall {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            auth: false,
            timeout: None,
            max_retries: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Send the session's bearer token.
    pub fn with_auth(mut self) -> Self {
        self.auth = true;
        self
    }

    /// Per-attempt deadline for this call only.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn requires_auth(&self) -> bool {
        self.auth
    }
}

/// A successful response, body fully read.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub endpoint: String,
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// A failed attempt and how to treat it.
struct AttemptFailure {
    error: ApiError,
    class: FailureClass,
    /// Counts against the endpoint's breaker.
    endpoint_failure: bool,
}

/// Releases a claimed breaker slot if the attempt is dropped mid-flight.
struct SlotGuard<'a> {
    breakers: &'a CircuitBreakerRegistry,
    url: &'a str,
    settled: bool,
}

impl SlotGuard<'_> {
    fn success(mut self) {
        self.breakers.record_success(self.url);
        self.settled = true;
    }

    fn failure(mut self) {
        self.breakers.record_failure(self.url);
        self.settled = true;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breakers.release(self.url);
        }
    }
}

pub struct ResilientExecutor {
    client: reqwest::Client,
    prober: Arc<EndpointProber>,
    breakers: CircuitBreakerRegistry,
    session: Arc<SessionStore>,
    policy: RetryPolicy,
    request_timeout: Duration,
    /// Set after a transport-level failure, cleared by the next success.
    offline: AtomicBool,
}

impl ResilientExecutor {
    pub fn new(
        client: reqwest::Client,
        prober: Arc<EndpointProber>,
        breakers: CircuitBreakerRegistry,
        session: Arc<SessionStore>,
        retry: RetryConfig,
        timeouts: &TimeoutConfig,
    ) -> Self {
        Self {
            client,
            prober,
            breakers,
            session,
            policy: RetryPolicy::new(retry),
            request_timeout: timeouts.request(),
            offline: AtomicBool::new(false),
        }
    }

    pub fn prober(&self) -> &Arc<EndpointProber> {
        &self.prober
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Run `call` and decode its JSON body into `T`.
    ///
    /// A `text/*` body is presented as `{"message": <text>}`.
    pub async fn execute<T: DeserializeOwned>(&self, call: ApiCall) -> ApiResult<T> {
        let raw = self.send(&call).await?;
        decode_body(&raw)
    }

    /// Run `call` and return the raw body.
    pub async fn execute_bytes(&self, call: ApiCall) -> ApiResult<RawResponse> {
        self.send(&call).await
    }

    async fn send(&self, call: &ApiCall) -> ApiResult<RawResponse> {
        let token = if call.auth { Some(self.bearer_token()?) } else { None };
        let policy = match call.max_retries {
            Some(n) => self.policy.with_max_retries(n),
            None => self.policy.clone(),
        };
        let timeout = call.timeout.unwrap_or(self.request_timeout);
        let mut retries_done = 0;

        loop {
            let Some(endpoint) = self.select_endpoint() else {
                tracing::warn!(
                    method = %call.method,
                    path = %call.path,
                    "Every endpoint circuit is open, failing fast"
                );
                self.offline.store(true, Ordering::Release);
                return Err(ApiError::ServiceUnavailable);
            };

            let guard = SlotGuard {
                breakers: &self.breakers,
                url: &endpoint,
                settled: false,
            };

            match self
                .attempt(call, &endpoint, token.as_deref(), timeout, retries_done + 1)
                .await
            {
                Ok(raw) => {
                    guard.success();
                    if self.offline.swap(false, Ordering::AcqRel) {
                        tracing::info!(endpoint = %endpoint, "Backend reachable again");
                        self.prober.notify_connectivity_restored();
                    }
                    return Ok(raw);
                }
                Err(failure) => {
                    if failure.endpoint_failure {
                        guard.failure();
                    } else {
                        guard.success();
                    }
                    if matches!(failure.error, ApiError::Network { .. }) {
                        self.offline.store(true, Ordering::Release);
                    }

                    if failure.class == FailureClass::Unauthorized {
                        self.end_rejected_session(call, token.as_deref());
                        return Err(failure.error);
                    }

                    if !policy.should_retry(failure.class, retries_done) {
                        if failure.class == FailureClass::Retryable {
                            tracing::error!(
                                method = %call.method,
                                path = %call.path,
                                attempts = retries_done + 1,
                                error = %failure.error,
                                "Retry budget exhausted"
                            );
                        }
                        return Err(failure.error);
                    }

                    retries_done += 1;
                    let delay = policy.delay(retries_done);
                    tracing::warn!(
                        method = %call.method,
                        path = %call.path,
                        endpoint = %endpoint,
                        retry = retries_done,
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.error,
                        "Retrying request"
                    );
                    metrics::record_retry(retry_reason(&failure.error));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// First ranked candidate whose breaker admits a request.
    fn select_endpoint(&self) -> Option<String> {
        self.prober
            .candidates()
            .into_iter()
            .find(|e| self.breakers.try_acquire(&e.url))
            .map(|e| e.url)
    }

    /// End the session a 401 was issued for, if it is still the current one.
    fn end_rejected_session(&self, call: &ApiCall, sent: Option<&str>) {
        let Some(sent) = sent else {
            return;
        };
        if self.session.current_token().as_deref() == Some(sent) {
            tracing::warn!(path = %call.path, "Backend rejected credentials, ending session");
            self.session.logout(SessionEndReason::SessionExpired);
        } else {
            tracing::debug!(path = %call.path, "Rejected token is no longer current, keeping session");
        }
    }

    fn bearer_token(&self) -> ApiResult<String> {
        self.session.token_for_request().map_err(|reason| match reason {
            TokenUnavailable::NotLoggedIn => ApiError::Auth("not logged in".to_string()),
            TokenUnavailable::Expired => ApiError::Auth("session expired".to_string()),
        })
    }

    async fn attempt(
        &self,
        call: &ApiCall,
        endpoint: &str,
        token: Option<&str>,
        timeout: Duration,
        attempt: u32,
    ) -> Result<RawResponse, AttemptFailure> {
        let url = format!("{}/api{}", endpoint, call.path);
        let request_id = Uuid::new_v4().to_string();

        let mut request = self
            .client
            .request(call.method.clone(), &url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(REQUEST_ID_HEADER, &request_id);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        tracing::debug!(
            method = %call.method,
            url = %url,
            attempt,
            request_id = %request_id,
            "Sending request"
        );

        let start = Instant::now();
        let result = with_deadline(timeout, async {
            let response = request.send().await?;
            let status = response.status();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, content_type, body.to_vec()))
        })
        .await;

        match result {
            Err(elapsed) => {
                metrics::record_request(call.method.as_str(), 0, endpoint, start);
                tracing::warn!(url = %url, attempt, timeout_ms = elapsed.0.as_millis() as u64, "Request timed out");
                Err(AttemptFailure {
                    error: ApiError::Timeout {
                        endpoint: endpoint.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    },
                    class: FailureClass::Retryable,
                    endpoint_failure: true,
                })
            }
            Ok(Err(e)) => {
                metrics::record_request(call.method.as_str(), 0, endpoint, start);
                tracing::warn!(url = %url, attempt, error = %e, "Request failed");
                Err(AttemptFailure {
                    error: ApiError::Network {
                        endpoint: endpoint.to_string(),
                        message: e.to_string(),
                    },
                    class: FailureClass::Retryable,
                    endpoint_failure: true,
                })
            }
            Ok(Ok((status, content_type, body))) => {
                metrics::record_request(call.method.as_str(), status.as_u16(), endpoint, start);
                if status.is_success() {
                    return Ok(RawResponse {
                        endpoint: endpoint.to_string(),
                        status,
                        content_type,
                        body,
                    });
                }

                let message = backend_message(status, &body);
                tracing::debug!(url = %url, status = status.as_u16(), message = %message, "Backend returned error");
                let class = classify_status(status);
                let error = if class == FailureClass::Unauthorized {
                    ApiError::Auth(message)
                } else {
                    ApiError::Http {
                        status: status.as_u16(),
                        message,
                    }
                };
                Err(AttemptFailure {
                    error,
                    class,
                    endpoint_failure: is_endpoint_failure(status),
                })
            }
        }
    }
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("max_retries", &self.policy.max_retries)
            .field("request_timeout_ms", &self.request_timeout.as_millis())
            .field("prober", &self.prober)
            .finish()
    }
}

fn retry_reason(error: &ApiError) -> &'static str {
    match error {
        ApiError::Network { .. } => "network",
        ApiError::Timeout { .. } => "timeout",
        ApiError::Http { status: 429, .. } => "rate_limited",
        _ => "server_error",
    }
}

/// The backend's own error text, if it sent one.
fn backend_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    match std::str::from_utf8(body).map(str::trim) {
        Ok(text) if !text.is_empty() && text.len() <= 200 && !text.starts_with('<') => text.to_string(),
        _ => status.canonical_reason().unwrap_or("request failed").to_string(),
    }
}

fn decode_body<T: DeserializeOwned>(raw: &RawResponse) -> ApiResult<T> {
    let is_text = raw
        .content_type
        .as_deref()
        .map(|ct| ct.starts_with("text/"))
        .unwrap_or(false);

    let result = if is_text {
        let text = String::from_utf8_lossy(&raw.body);
        serde_json::from_value(serde_json::json!({ "message": text }))
    } else if raw.body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_value(serde_json::Value::Null)
    } else {
        serde_json::from_slice(&raw.body)
    };

    result.map_err(|e| {
        tracing::warn!(endpoint = %raw.endpoint, error = %e, "Response body did not match expected shape");
        ApiError::Decode(e.to_string())
    })
}
