//! Resilient client for the Cambio Angola exchange-rate backend.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller
//!     │
//!     ▼
//! ┌──────────┐   ApiCall   ┌────────────────────┐  HTTP  ┌──────────┐
//! │   api    │────────────▶│ resilience::executor│──────▶│ backend  │
//! │ (facade) │◀────────────│ timeout/retry/breaker│◀──────│  /api/*  │
//! └──────────┘  typed T    └─────────┬──────────┘        └──────────┘
//!                                    │ target URL            ▲
//!                          ┌─────────┴─────────┐             │ GET /api/health
//!                          │  health::prober   │─────────────┘
//!                          │  ranked endpoints │
//!                          └───────────────────┘
//!   session::store: bearer token + profile, persisted under `userSession`
//! ```
//!
//! Shared services are built once by [`lifecycle::Services::bootstrap`].

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod session;

pub use api::CambioApi;
pub use config::schema::ClientConfig;
pub use error::{ApiError, ApiResult, UserHint};
pub use lifecycle::{Services, Shutdown};
