//! Goldentime Domain Layer
//!
//! Pure domain types with zero I/O dependencies: validated value objects,
//! the trade request, and the run state a lifecycle mutates.

#![warn(clippy::all)]

// Public modules
pub mod credentials;
pub mod request;
pub mod run;
pub mod value_objects;

// Re-export commonly used types
pub use credentials::{ApiCredentials, Exchange};
pub use request::{EntrySchedule, RiskSpec, TradeRequest, WallClockZone};
pub use run::{CloseOutcome, ExitReason, RunId, RunSnapshot, TradePhase, TradeRunState};
pub use value_objects::{DomainError, OrderSide, Price, Quantity, Side, Symbol, TriggerReference};
