//! Active endpoint probing.
//!
//! # Responsibilities
//! - Probe every configured base URL concurrently
//! - Keep a ranked snapshot of the results
//! - Answer "which endpoint should the next request go to"

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use arc_swap::ArcSwap;
use chrono::Utc;
use futures_util::future::join_all;
use reqwest::header::{ACCEPT, USER_AGENT};
use tokio::sync::{broadcast, Notify};
use tokio::time;

use crate::config::ProbeConfig;
use crate::health::state::{rank, Endpoint, EndpointStatus, ProbeResult};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreakerRegistry;
use crate::resilience::timeouts::with_deadline;

/// Clears the in-progress flag when a refresh ends or is dropped.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct EndpointProber {
    client: reqwest::Client,
    config: ProbeConfig,
    /// Configuration order; the degrade-to-default fallback reads from here.
    configured: Vec<Endpoint>,
    /// Latest ranked view, swapped whole after each refresh.
    ranked: ArcSwap<Vec<Endpoint>>,
    breakers: CircuitBreakerRegistry,
    refreshing: AtomicBool,
    connectivity_restored: Notify,
}

impl EndpointProber {
    pub fn new(
        urls: &[String],
        config: ProbeConfig,
        breakers: CircuitBreakerRegistry,
        client: reqwest::Client,
    ) -> Self {
        let configured: Vec<Endpoint> = urls.iter().map(Endpoint::new).collect();
        Self {
            client,
            config,
            ranked: ArcSwap::from_pointee(configured.clone()),
            configured,
            breakers,
            refreshing: AtomicBool::new(false),
            connectivity_restored: Notify::new(),
        }
    }

    /// Probe one base URL with the configured timeout.
    pub async fn probe(&self, url: &str) -> ProbeResult {
        self.probe_with_timeout(url, self.config.timeout()).await
    }

    /// Probe one base URL. Fails closed: anything but a timely 2xx is Offline.
    pub async fn probe_with_timeout(&self, url: &str, timeout: Duration) -> ProbeResult {
        let target = format!("{}{}", url, self.config.path);
        let start = Instant::now();

        let request = self
            .client
            .get(&target)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, "cambio-client-health-check")
            .send();

        let (status, error) = match with_deadline(timeout, request).await {
            Ok(Ok(response)) => {
                if response.status().is_success() {
                    (EndpointStatus::Online, None)
                } else {
                    tracing::warn!(endpoint = %url, status = %response.status(), "Probe failed: non-success status");
                    (EndpointStatus::Offline, Some(format!("HTTP {}", response.status().as_u16())))
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(endpoint = %url, error = %e, "Probe failed: connection error");
                (EndpointStatus::Offline, Some(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(endpoint = %url, timeout_ms = timeout.as_millis() as u64, "Probe failed: timeout");
                (EndpointStatus::Offline, Some("timeout".to_string()))
            }
        };

        let latency = start.elapsed();
        metrics::record_endpoint_health(
            url,
            status == EndpointStatus::Online,
            Some(latency.as_millis() as u64),
        );

        ProbeResult {
            url: url.to_string(),
            status,
            latency,
            checked_at: Utc::now(),
            error,
        }
    }

    /// Probe every endpoint concurrently and publish the new ranking.
    ///
    /// A refresh already in progress is not duplicated; callers get the
    /// current snapshot instead.
    pub async fn refresh(&self) -> Vec<Endpoint> {
        if self.refreshing.swap(true, Ordering::AcqRel) {
            return self.snapshot();
        }
        let _guard = RefreshGuard(&self.refreshing);

        let results = join_all(self.configured.iter().map(|e| self.probe(&e.url))).await;

        let mut endpoints = self.configured.clone();
        for (endpoint, result) in endpoints.iter_mut().zip(results.iter()) {
            endpoint.apply(result);
        }
        let ranked = rank(&endpoints);

        match ranked.first().filter(|e| e.is_online()) {
            Some(best) => tracing::info!(
                endpoint = %best.url,
                latency_ms = best.last_latency_ms.unwrap_or_default(),
                "Best endpoint selected"
            ),
            None => tracing::warn!(
                fallback = %self.configured.first().map(|e| e.url.as_str()).unwrap_or("none"),
                "No endpoint online, using fallback"
            ),
        }

        self.ranked.store(Arc::new(ranked.clone()));
        ranked
    }

    /// Latest ranked endpoints.
    pub fn snapshot(&self) -> Vec<Endpoint> {
        self.ranked.load().as_ref().clone()
    }

    /// Candidates in the order the executor should try them.
    pub fn candidates(&self) -> Vec<Endpoint> {
        self.snapshot()
    }

    /// Fastest Online endpoint whose circuit admits traffic.
    ///
    /// With nothing Online, falls back to the first configured endpoint the
    /// breaker admits, and finally to the first configured endpoint. The
    /// returned endpoint may therefore be unreachable.
    pub fn best_endpoint(&self) -> Option<Endpoint> {
        let ranked = self.ranked.load();
        ranked
            .iter()
            .find(|e| e.is_online() && self.breakers.is_available(&e.url))
            .cloned()
            .or_else(|| {
                self.configured
                    .iter()
                    .find(|e| self.breakers.is_available(&e.url))
                    .cloned()
            })
            .or_else(|| self.configured.first().cloned())
    }

    pub fn configured(&self) -> &[Endpoint] {
        &self.configured
    }

    /// Ask the background loop to re-probe now.
    pub fn notify_connectivity_restored(&self) {
        self.connectivity_restored.notify_one();
    }

    /// Periodic probe loop; exits on the shutdown signal.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Endpoint probing disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            path = %self.config.path,
            endpoints = self.configured.len(),
            "Endpoint prober starting"
        );

        let mut ticker = time::interval(self.config.interval());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh().await;
                }
                _ = self.connectivity_restored.notified() => {
                    tracing::info!("Connectivity restored, re-probing endpoints");
                    self.refresh().await;
                    ticker.reset();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Endpoint prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for EndpointProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointProber")
            .field("endpoints", &self.configured.len())
            .field("path", &self.config.path)
            .field("timeout_ms", &self.config.timeout_ms)
            .finish()
    }
}
