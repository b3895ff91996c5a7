//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together:
//! - Venue sessions (stub in test, Bybit otherwise)
//! - Trade registry (one task per active run)
//! - API Server (HTTP endpoints)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Build the process-wide venue session
//! 3. Start API server
//! 4. Wait for SIGINT
//! 5. Stop every active run and wait (bounded) for its cleanup

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use goldentime_exec::{ExchangeGateway, StubExchange, SystemClock, TimeoutGateway};

use crate::api::{create_router, ApiState};
use crate::config::{Config, Environment};
use crate::error::{DaemonError, DaemonResult};
use crate::registry::TradeRegistry;
use crate::session::{BybitSessions, GatewayFactory, SharedGateway};

/// How long shutdown waits for runs to close their positions.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

// =============================================================================
// Daemon
// =============================================================================

/// The goldentime daemon.
pub struct Daemon {
    /// Configuration
    config: Config,
    /// Trade registry
    registry: Arc<TradeRegistry>,
}

impl Daemon {
    /// Create a daemon backed by an in-memory venue (test environment).
    pub fn new_stub(config: Config) -> Self {
        let stub = Arc::new(StubExchange::new(Decimal::new(95000, 0)));
        stub.set_lows(
            [94200, 94650, 94400, 93900, 94800]
                .into_iter()
                .map(|v| Decimal::new(v, 0))
                .collect(),
        );
        stub.set_highs(
            [95600, 95300, 95900, 95450, 96100]
                .into_iter()
                .map(|v| Decimal::new(v, 0))
                .collect(),
        );
        stub.set_balance("USDT", Decimal::new(10_000, 0));

        let gateway: Arc<dyn ExchangeGateway> =
            Arc::new(TimeoutGateway::new(stub, config.lifecycle.exchange_timeout));
        Self::with_sessions(config, Arc::new(SharedGateway::new(gateway)))
    }

    /// Create a daemon talking to Bybit.
    pub fn new_bybit(config: Config) -> Self {
        let sessions = BybitSessions::new(
            config.exchange.credentials.clone(),
            config.exchange.exchange(),
            config.lifecycle.exchange_timeout,
        );
        Self::with_sessions(config, Arc::new(sessions))
    }

    /// Pick the venue from the configured environment.
    pub fn from_config(config: Config) -> Self {
        match config.environment {
            Environment::Test => Self::new_stub(config),
            Environment::Development | Environment::Production => {
                if config.exchange.credentials.is_none() {
                    warn!("No default Bybit credentials; runs must supply their own");
                }
                Self::new_bybit(config)
            }
        }
    }

    /// Create a daemon with provided venue sessions.
    pub fn with_sessions(config: Config, sessions: Arc<dyn GatewayFactory>) -> Self {
        let registry = Arc::new(TradeRegistry::new(
            sessions,
            Arc::new(SystemClock),
            config.lifecycle.clone(),
        ));
        Self { config, registry }
    }

    /// The trade registry.
    pub fn registry(&self) -> Arc<TradeRegistry> {
        self.registry.clone()
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            exchange = self.config.exchange.exchange().as_str(),
            wall_clock = %self.config.wall_clock,
            "Starting goldentime daemon"
        );

        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| DaemonError::Config(format!("Failed to listen for SIGINT: {}", e)))?;
        info!("Received shutdown signal");

        self.shutdown().await;
        Ok(())
    }

    /// Start the API server.
    async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState {
            registry: self.registry.clone(),
            wall_clock: self.config.wall_clock,
        });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;

        let local_addr = listener.local_addr().map_err(|e| {
            DaemonError::Config(format!("Failed to get local address: {}", e))
        })?;

        // Spawn the server task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }

    /// Graceful shutdown: stop every run, wait for cleanup.
    async fn shutdown(&self) {
        info!("Initiating graceful shutdown");

        let unfinished = self.registry.stop_all_and_wait(SHUTDOWN_GRACE).await;
        if unfinished > 0 {
            warn!(unfinished, "Exiting with runs still cleaning up");
        }

        info!("Shutdown complete");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_daemon_stub_creation() {
        let daemon = Daemon::new_stub(Config::test());

        assert_eq!(daemon.registry().active_count().await, 0);
        let price = daemon
            .registry()
            .gateway()
            .get_price(&goldentime_domain::Symbol::from_pair("BTCUSDT").unwrap())
            .await
            .unwrap();
        assert_eq!(price.as_decimal(), Decimal::new(95000, 0));
    }

    #[tokio::test]
    async fn test_daemon_from_test_config_uses_stub() {
        let daemon = Daemon::from_config(Config::test());
        let balance = daemon.registry().gateway().get_account_balance("USDT").await.unwrap();
        assert_eq!(balance, Decimal::new(10_000, 0));
    }

    #[tokio::test]
    async fn test_daemon_api_server_start() {
        let daemon = Daemon::new_stub(Config::test());

        let addr = daemon.start_api_server().await.unwrap();

        // Server should be running on a port
        assert!(addr.port() > 0);

        // Can make a health check request
        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_shutdown_with_no_runs() {
        let daemon = Daemon::new_stub(Config::test());
        daemon.shutdown().await;
        assert_eq!(daemon.registry().active_count().await, 0);
    }
}
