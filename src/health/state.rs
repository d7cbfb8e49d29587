//! Endpoint health state and ranking.
//!
//! # States
//! - Unknown: not probed yet
//! - Online: last probe returned 2xx within the timeout
//! - Offline: last probe failed (timeout, transport error, non-2xx)
//!
//! Ranking puts Online endpoints first by ascending latency, then Unknown,
//! then Offline; ties keep configuration order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Unknown,
    Online,
    Offline,
}

impl EndpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Unknown => "unknown",
            EndpointStatus::Online => "online",
            EndpointStatus::Offline => "offline",
        }
    }

    fn rank_key(&self) -> u8 {
        match self {
            EndpointStatus::Online => 0,
            EndpointStatus::Unknown => 1,
            EndpointStatus::Offline => 2,
        }
    }
}

/// One candidate backend base URL and what the last probe said about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Endpoint {
    /// Base URL without trailing slash, e.g. `https://api.example.com`.
    pub url: String,
    pub last_latency_ms: Option<u64>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub status: EndpointStatus,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: normalize_base_url(&url.into()),
            last_latency_ms: None,
            last_checked_at: None,
            status: EndpointStatus::Unknown,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == EndpointStatus::Online
    }

    /// Apply a probe outcome.
    pub fn apply(&mut self, result: &ProbeResult) {
        self.status = result.status;
        self.last_latency_ms = Some(result.latency.as_millis() as u64);
        self.last_checked_at = Some(result.checked_at);
    }
}

/// Outcome of a single liveness probe.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub url: String,
    pub status: EndpointStatus,
    pub latency: Duration,
    pub checked_at: DateTime<Utc>,
    /// Why the probe failed, if it did.
    pub error: Option<String>,
}

/// Strip trailing slashes so URLs compare and join predictably.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Order endpoints for selection.
pub fn rank(endpoints: &[Endpoint]) -> Vec<Endpoint> {
    let mut ranked = endpoints.to_vec();
    // sort_by_key is stable, so equal keys keep configuration order
    ranked.sort_by_key(|e| {
        let latency = if e.is_online() { e.last_latency_ms.unwrap_or(u64::MAX) } else { 0 };
        (e.status.rank_key(), latency)
    });
    ranked
}
