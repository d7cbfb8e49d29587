//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cambio_requests_total` (counter): attempts by endpoint, status
//! - `cambio_request_duration_seconds` (histogram): attempt latency
//! - `cambio_retries_total` (counter): retries by reason
//! - `cambio_breaker_transitions_total` (counter): breaker state changes
//! - `cambio_endpoint_up` (gauge): 1=online, 0=offline
//! - `cambio_endpoint_latency_ms` (gauge): last probe latency
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one request attempt. `status` is 0 when no response arrived.
pub fn record_request(method: &str, status: u16, endpoint: &str, start: Instant) {
    let status = status.to_string();
    counter!(
        "cambio_requests_total",
        "method" => method.to_string(),
        "status" => status,
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
    histogram!("cambio_request_duration_seconds", "endpoint" => endpoint.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_retry(reason: &'static str) {
    counter!("cambio_retries_total", "reason" => reason).increment(1);
}

pub fn record_breaker_transition(endpoint: &str, state: &'static str) {
    counter!(
        "cambio_breaker_transitions_total",
        "endpoint" => endpoint.to_string(),
        "state" => state
    )
    .increment(1);
}

pub fn record_endpoint_health(endpoint: &str, online: bool, latency_ms: Option<u64>) {
    gauge!("cambio_endpoint_up", "endpoint" => endpoint.to_string())
        .set(if online { 1.0 } else { 0.0 });
    if let Some(ms) = latency_ms {
        gauge!("cambio_endpoint_latency_ms", "endpoint" => endpoint.to_string()).set(ms as f64);
    }
}

pub fn record_session_event(kind: &'static str) {
    counter!("cambio_session_events_total", "kind" => kind).increment(1);
}
