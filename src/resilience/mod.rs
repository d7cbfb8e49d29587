//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Logical API call:
//!     → executor.rs picks an endpoint (prober ranking + circuit_breaker.rs)
//!     → timeouts.rs bounds the attempt
//!     → On failure: retries.rs classifies, backoff.rs spaces the retry
//!     → circuit_breaker.rs records every attempt's outcome
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - One executor for every call; the API facade holds no retry logic
//! - Circuit breaker is per endpoint, not global
//! - Retries within one call are strictly sequential

pub mod backoff;
pub mod circuit_breaker;
pub mod executor;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerState, CircuitBreakerRegistry};
pub use executor::{ApiCall, ResilientExecutor};
pub use retries::RetryPolicy;
