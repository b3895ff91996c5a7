//! Error types for the engine

use goldentime_domain::DomainError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// No price levels to derive a stop from
    #[error("No data: {0}")]
    NoData(String),

    /// Entry and stop-loss coincide
    #[error("Stop distance is zero (entry {entry}, stop {stop})")]
    ZeroStopDistance { entry: Decimal, stop: Decimal },

    /// Fallback fraction outside (0, 1)
    #[error("Invalid fallback fraction: {0}")]
    InvalidFallbackFraction(Decimal),

    /// Lot-size filter or adjusted quantity is unusable
    #[error("Invalid lot size: {0}")]
    InvalidLotSize(String),

    /// Domain validation failed
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
