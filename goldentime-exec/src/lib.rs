//! Goldentime Execution Layer
//!
//! Ports for everything a trade run touches outside its own memory: the
//! exchange venue and the clock.
//!
//! # Components
//!
//! - **Ports**: `ExchangeGateway`, the narrow capability set a run needs
//! - **Clock**: `SupervisorClock` with a wall-clock and a manual implementation
//! - **Guarded**: `TimeoutGateway`, bounding every exchange call
//! - **Stub**: `StubExchange`, an in-memory venue for tests and the test env
//!
//! # Example
//!
//! ```rust,ignore
//! use goldentime_exec::{ExchangeGateway, StubExchange, TimeoutGateway};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let venue = Arc::new(StubExchange::new(dec!(100)));
//! let gateway: Arc<dyn ExchangeGateway> =
//!     Arc::new(TimeoutGateway::new(venue, Duration::from_secs(10)));
//! let price = gateway.get_price(&symbol).await?;
//! ```

#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod guarded;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use clock::{ManualClock, SupervisorClock, SystemClock};
pub use error::{ExecError, ExecResult};
pub use guarded::TimeoutGateway;
pub use ports::{ExchangeGateway, ExtremeKind, PlacedOrder};
pub use stub::{GatewayCall, StubExchange, StubOp};
