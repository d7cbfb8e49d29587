//! Typed facade over the Cambio backend.

pub mod facade;
pub mod types;
pub mod validation;

pub use facade::CambioApi;
pub use types::{
    AdminUser, Alert, AlertDirection, AlertRequest, AuthOutcome, AuthResponse, Currency, DailyRate,
    GoogleCredential, NewAlert, RateBoard, RateType, RatesExport, ServerMessage, Simulation,
};
