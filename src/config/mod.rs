//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! cambio.toml (optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (CAMBIO_* environment overrides)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → handed to lifecycle::startup to build the services
//! ```
//!
//! # Design Decisions
//! - Config is read once at start; there is no runtime reconfiguration
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ClientConfig;
pub use schema::{
    BreakerConfig, EndpointsConfig, ObservabilityConfig, ProbeConfig, RetryConfig, SessionConfig,
    TimeoutConfig,
};
