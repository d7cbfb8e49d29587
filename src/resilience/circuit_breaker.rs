//! Circuit breaker registry for endpoint protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: endpoint assumed down, requests fail fast
//! - Half-Open: testing if endpoint recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: cooldown elapsed (evaluated lazily on access)
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails
//! ```
//!
//! Only one trial request is admitted per Half-Open window; the slot is
//! claimed by `try_acquire` and released by the next recorded outcome.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use dashmap::DashMap;
use serde::Serialize;

use crate::config::BreakerConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
struct BreakerEntry {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    last_success: Option<SystemTime>,
}

impl Default for BreakerEntry {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
            last_success: None,
        }
    }
}

impl BreakerEntry {
    /// Move Open → HalfOpen once the cooldown has elapsed.
    fn refresh(&mut self, cooldown: Duration) -> bool {
        if self.state == BreakerState::Open {
            if let Some(opened_at) = self.opened_at {
                if opened_at.elapsed() >= cooldown {
                    self.state = BreakerState::HalfOpen;
                    self.trial_in_flight = false;
                    return true;
                }
            }
        }
        false
    }

    fn admits(&self) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => !self.trial_in_flight,
            BreakerState::Open => false,
        }
    }
}

/// Point-in-time view of one endpoint's breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub endpoint_url: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    /// Milliseconds since the circuit opened, if it is open.
    pub open_for_ms: Option<u64>,
    pub last_success: Option<SystemTime>,
    pub available: bool,
}

/// Per-endpoint circuit breakers, shared by the prober and the executor.
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    entries: Arc<DashMap<String, BreakerEntry>>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreakerRegistry {
    pub fn new(config: &BreakerConfig) -> Self {
        Self::with_settings(config.failure_threshold, config.cooldown())
    }

    pub fn with_settings(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Reset the failure counter and close the circuit.
    pub fn record_success(&self, url: &str) {
        let mut entry = self.entries.entry(url.to_string()).or_default();
        let previous = entry.state;
        entry.state = BreakerState::Closed;
        entry.consecutive_failures = 0;
        entry.opened_at = None;
        entry.trial_in_flight = false;
        entry.last_success = Some(SystemTime::now());
        drop(entry);

        if previous != BreakerState::Closed {
            tracing::info!(endpoint = %url, from = previous.as_str(), "Circuit closed");
            metrics::record_breaker_transition(url, BreakerState::Closed.as_str());
        }
    }

    /// Count a failure; open the circuit at the threshold or on a failed trial.
    pub fn record_failure(&self, url: &str) {
        let mut entry = self.entries.entry(url.to_string()).or_default();
        entry.refresh(self.cooldown);
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.trial_in_flight = false;

        let should_open = match entry.state {
            BreakerState::Closed => entry.consecutive_failures >= self.failure_threshold,
            BreakerState::HalfOpen => true,
            BreakerState::Open => false,
        };

        if should_open {
            entry.state = BreakerState::Open;
            entry.opened_at = Some(Instant::now());
        }
        let failures = entry.consecutive_failures;
        drop(entry);

        if should_open {
            tracing::warn!(
                endpoint = %url,
                failures,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Circuit opened"
            );
            metrics::record_breaker_transition(url, BreakerState::Open.as_str());
        } else {
            tracing::debug!(endpoint = %url, failures, "Failure recorded");
        }
    }

    /// True if a request may be sent to `url` right now.
    ///
    /// Unknown endpoints are Closed.
    pub fn is_available(&self, url: &str) -> bool {
        match self.entries.get_mut(url) {
            Some(mut entry) => {
                if entry.refresh(self.cooldown) {
                    metrics::record_breaker_transition(url, BreakerState::HalfOpen.as_str());
                }
                entry.admits()
            }
            None => true,
        }
    }

    /// Admit a request to `url`, claiming the Half-Open trial slot if needed.
    pub fn try_acquire(&self, url: &str) -> bool {
        let mut entry = self.entries.entry(url.to_string()).or_default();
        if entry.refresh(self.cooldown) {
            tracing::info!(endpoint = %url, "Circuit half-open, admitting trial request");
            metrics::record_breaker_transition(url, BreakerState::HalfOpen.as_str());
        }
        if !entry.admits() {
            return false;
        }
        if entry.state == BreakerState::HalfOpen {
            entry.trial_in_flight = true;
        }
        true
    }

    /// Release an acquired slot without recording an outcome.
    pub fn release(&self, url: &str) {
        if let Some(mut entry) = self.entries.get_mut(url) {
            entry.trial_in_flight = false;
        }
    }

    pub fn state(&self, url: &str) -> BreakerState {
        match self.entries.get_mut(url) {
            Some(mut entry) => {
                entry.refresh(self.cooldown);
                entry.state
            }
            None => BreakerState::Closed,
        }
    }

    pub fn consecutive_failures(&self, url: &str) -> u32 {
        self.entries.get(url).map(|e| e.consecutive_failures).unwrap_or(0)
    }

    /// Snapshot of every endpoint the registry has seen.
    pub fn stats(&self) -> Vec<BreakerSnapshot> {
        let mut stats: Vec<BreakerSnapshot> = self
            .entries
            .iter_mut()
            .map(|mut r| {
                r.value_mut().refresh(self.cooldown);
                let entry = r.value();
                BreakerSnapshot {
                    endpoint_url: r.key().clone(),
                    state: entry.state,
                    consecutive_failures: entry.consecutive_failures,
                    open_for_ms: entry
                        .opened_at
                        .filter(|_| entry.state == BreakerState::Open)
                        .map(|t| t.elapsed().as_millis() as u64),
                    last_success: entry.last_success,
                    available: entry.admits(),
                }
            })
            .collect();
        stats.sort_by(|a, b| a.endpoint_url.cmp(&b.endpoint_url));
        stats
    }

    /// Forget every breaker.
    pub fn reset(&self) {
        self.entries.clear();
        tracing::info!("Circuit breaker registry reset");
    }
}
