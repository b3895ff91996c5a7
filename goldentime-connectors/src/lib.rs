//! Goldentime Exchange Connectors
//!
//! Venue adapters implementing `ExchangeGateway`.
//! Normalizes exchange-specific payloads to domain types.

#![warn(clippy::all)]

// Public modules
pub mod bybit_rest;

// Re-exports
pub use bybit_rest::{BybitRestClient, BybitRestError, InstrumentFilters};
