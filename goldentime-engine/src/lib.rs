//! Goldentime Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Stop-loss derivation from recent price structure and fixed-risk sizing.

#![warn(clippy::all)]

pub mod error;
pub mod price_levels;
pub mod sizing;

pub use error::{EngineError, EngineResult};
pub use price_levels::{snap_to_tick, PriceLevelAnalyzer, StopLossBasis, StopLossDerivation};
pub use sizing::{adjust_quantity, compute_quantity_from_risk, LotSizeFilter};
