//! Goldentime Daemon Library
//!
//! Runtime for scheduled single-trade cycles.
//!
//! # Architecture
//!
//! ```text
//! HTTP API → Trade Registry → Lifecycle Controller (one task per run)
//!                                   ↓            ↓
//!                       PriceLevelAnalyzer   ExchangeGateway → Bybit / Stub
//!                          PositionSizer
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **Controller**: The per-run state machine
//! - **Registry**: Start / stop / status by run identifier
//! - **Session**: Venue session per run (shared or per credentials)
//! - **API**: HTTP endpoints
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use goldentimed::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::from_config(config);
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod error;
pub mod registry;
pub mod session;

// Re-exports for convenience
pub use config::{ApiConfig, Config, Environment, ExchangeConfig, LifecycleConfig, LoggingConfig};
pub use controller::TradeLifecycleController;
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use registry::{TradeRegistry, DEFAULT_RUN};
pub use session::{BybitSessions, GatewayFactory, SharedGateway, SHARED_ACCOUNT};
