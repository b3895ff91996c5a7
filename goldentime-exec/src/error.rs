//! Execution layer error types.

use thiserror::Error;

/// Errors that can occur during exchange operations.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// Exchange communication error
    #[error("Exchange error: {0}")]
    Exchange(String),

    /// Order was rejected by exchange
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// Venue answered with something we cannot use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] goldentime_domain::DomainError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Call did not complete in time
    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
