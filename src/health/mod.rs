//! Endpoint health subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer / connectivity restored
//!     → active.rs probes every base URL concurrently
//!     → state.rs ranks the results (Online first, fastest first)
//!     → ranked snapshot swapped in atomically
//!
//! Request executor
//!     → active.rs candidates() / best_endpoint()
//!     → filtered through the circuit breaker registry
//! ```
//!
//! # Design Decisions
//! - Probe latency is bounded by the slowest single probe, not the sum
//! - With nothing online the first configured endpoint is still returned
//! - Health state is never persisted

pub mod active;
pub mod state;

pub use active::EndpointProber;
pub use state::{Endpoint, EndpointStatus, ProbeResult};
