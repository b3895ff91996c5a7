//! Daemon error types.

use goldentime_domain::DomainError;
use goldentime_engine::EngineError;
use goldentime_exec::ExecError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// A non-terminal run already holds this id
    #[error("Trade already running for {0}")]
    RunAlreadyActive(String),

    /// Another live run already trades this symbol on the same account
    #[error("Trade on {symbol} already running under {holder}")]
    SymbolBusy { symbol: String, holder: String },

    /// No live run under this id
    #[error("No trade running for {0}")]
    RunNotFound(String),

    /// Rejected before any exchange call
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Run task panicked
    #[error("Run panicked: {0}")]
    Panicked(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
