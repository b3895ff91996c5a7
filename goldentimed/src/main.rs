//! Goldentime Daemon
//!
//! Runs scheduled single-trade cycles on Bybit linear futures behind a small
//! HTTP API.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p goldentimed
//!
//! # Start against the in-memory venue
//! GOLDENTIME_ENV=test GOLDENTIME_API_PORT=8081 cargo run -p goldentimed
//! ```
//!
//! # Environment Variables
//!
//! - `GOLDENTIME_ENV`: Environment (test, development, production)
//! - `GOLDENTIME_API_HOST`: API host (default: 0.0.0.0)
//! - `GOLDENTIME_API_PORT`: API port (default: 8000)
//! - `GOLDENTIME_WALL_CLOCK_OFFSET`: zone for naive request times (default: +00:00)
//! - `GOLDENTIME_ENTRY_POLL_MS` / `GOLDENTIME_SUPERVISE_POLL_MS`: poll intervals
//! - `GOLDENTIME_STOP_TRIGGER`: last, mark or index
//! - `BYBIT_API_KEY` / `BYBIT_API_SECRET`: default venue credentials
//! - `GOLDENTIME_BYBIT_TESTNET`: use testnet (default: true)
//! - `GOLDENTIME_LOG_JSON`: JSON log lines
//! - `GOLDENTIME_LOG_FILE`: append-only run log

use std::fs::OpenOptions;
use std::sync::Arc;

use goldentimed::{Config, Daemon, LoggingConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("goldentimed=info".parse()?);

    let console = if logging.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let file = match &logging.file {
        Some(path) => {
            let handle = OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(handle)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Goldentime Daemon"
    );

    // Create and run daemon
    let daemon = Daemon::from_config(config);
    daemon.run().await?;

    Ok(())
}
