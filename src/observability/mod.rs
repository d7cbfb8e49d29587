//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! prober / breaker / executor / session store produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stderr via tracing-subscriber
//!     → Prometheus scrape endpoint (`cambio watch`)
//! ```

pub mod logging;
pub mod metrics;
