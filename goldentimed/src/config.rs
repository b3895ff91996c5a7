//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! A `.env` file in the working directory is honored.

use crate::error::{DaemonError, DaemonResult};
use goldentime_domain::{ApiCredentials, Exchange, TriggerReference, WallClockZone};
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Trade lifecycle tuning
    pub lifecycle: LifecycleConfig,

    /// Venue session used when a request carries no credentials
    pub exchange: ExchangeConfig,

    /// Zone in which wall-clock request fields are read
    pub wall_clock: WallClockZone,

    /// Log output
    pub logging: LoggingConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Knobs of a single trade run.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Poll interval while waiting for the entry time
    pub entry_poll: Duration,
    /// Poll interval while supervising an open position
    pub supervise_poll: Duration,
    /// Candle interval used for price levels (venue notation, e.g. "30")
    pub candle_interval: String,
    /// Number of completed candles to inspect
    pub candle_count: usize,
    /// Ticks added beyond the chosen level
    pub tick_offset: u32,
    /// Fallback stop distance (0.01 = 1%)
    pub fallback_stop_fraction: Decimal,
    /// Default take-profit distance (0.02 = 2%)
    pub take_profit_ratio: Decimal,
    /// Share of the position covered by the take-profit limit
    pub take_profit_fraction: Decimal,
    /// Price the venue watches for the stop-loss
    pub stop_trigger: TriggerReference,
    /// Budget for a single exchange call
    pub exchange_timeout: Duration,
}

/// Process-wide venue session.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub credentials: Option<ApiCredentials>,
    pub testnet: bool,
}

impl ExchangeConfig {
    pub fn exchange(&self) -> Exchange {
        Exchange::from_testnet(self.testnet)
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Append-only run log (informational)
    pub file: Option<PathBuf>,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses the stub venue)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let lifecycle = Self::load_lifecycle_config()?;
        let exchange = Self::load_exchange_config()?;
        let logging = Self::load_logging_config();

        let wall_clock = match env::var("GOLDENTIME_WALL_CLOCK_OFFSET") {
            Ok(val) => WallClockZone::from_offset_str(&val).map_err(|e| {
                DaemonError::Config(format!("Invalid GOLDENTIME_WALL_CLOCK_OFFSET: {}", e))
            })?,
            Err(_) => WallClockZone::utc(),
        };

        Ok(Self {
            api,
            lifecycle,
            exchange,
            wall_clock,
            logging,
            environment,
        })
    }

    /// Create test configuration.
    ///
    /// Short poll intervals, stub venue, OS-assigned port.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            lifecycle: LifecycleConfig {
                entry_poll: Duration::from_millis(10),
                supervise_poll: Duration::from_millis(10),
                exchange_timeout: Duration::from_secs(1),
                ..LifecycleConfig::default()
            },
            exchange: ExchangeConfig {
                credentials: None,
                testnet: true,
            },
            wall_clock: WallClockZone::utc(),
            logging: LoggingConfig::default(),
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("GOLDENTIME_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid GOLDENTIME_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("GOLDENTIME_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port_str = env::var("GOLDENTIME_API_PORT").unwrap_or_else(|_| "8000".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            DaemonError::Config(format!("Invalid GOLDENTIME_API_PORT: {}", port_str))
        })?;

        Ok(ApiConfig { host, port })
    }

    fn load_lifecycle_config() -> DaemonResult<LifecycleConfig> {
        let defaults = LifecycleConfig::default();

        let stop_trigger = match env::var("GOLDENTIME_STOP_TRIGGER") {
            Ok(val) => TriggerReference::from_str(&val).map_err(|e| {
                DaemonError::Config(format!("Invalid GOLDENTIME_STOP_TRIGGER: {}", e))
            })?,
            Err(_) => defaults.stop_trigger,
        };

        let config = LifecycleConfig {
            entry_poll: Duration::from_millis(Self::load_parsed_env(
                "GOLDENTIME_ENTRY_POLL_MS",
                1000u64,
            )?),
            supervise_poll: Duration::from_millis(Self::load_parsed_env(
                "GOLDENTIME_SUPERVISE_POLL_MS",
                2000u64,
            )?),
            candle_interval: env::var("GOLDENTIME_CANDLE_INTERVAL")
                .unwrap_or(defaults.candle_interval),
            candle_count: Self::load_parsed_env("GOLDENTIME_CANDLE_COUNT", defaults.candle_count)?,
            tick_offset: Self::load_parsed_env("GOLDENTIME_TICK_OFFSET", defaults.tick_offset)?,
            fallback_stop_fraction: Self::load_decimal_env(
                "GOLDENTIME_FALLBACK_STOP_FRACTION",
                defaults.fallback_stop_fraction,
            )?,
            take_profit_ratio: Self::load_decimal_env(
                "GOLDENTIME_TAKE_PROFIT_RATIO",
                defaults.take_profit_ratio,
            )?,
            take_profit_fraction: Self::load_decimal_env(
                "GOLDENTIME_TAKE_PROFIT_FRACTION",
                defaults.take_profit_fraction,
            )?,
            stop_trigger,
            exchange_timeout: Duration::from_secs(Self::load_parsed_env(
                "GOLDENTIME_EXCHANGE_TIMEOUT_SECS",
                10u64,
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    fn load_exchange_config() -> DaemonResult<ExchangeConfig> {
        let credentials = match (env::var("BYBIT_API_KEY"), env::var("BYBIT_API_SECRET")) {
            (Ok(key), Ok(secret)) => Some(ApiCredentials::new(key, secret)),
            _ => None,
        };
        let testnet = Self::load_parsed_env("GOLDENTIME_BYBIT_TESTNET", true)?;

        Ok(ExchangeConfig {
            credentials,
            testnet,
        })
    }

    fn load_logging_config() -> LoggingConfig {
        LoggingConfig {
            json: env::var("GOLDENTIME_LOG_JSON")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            file: env::var("GOLDENTIME_LOG_FILE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    fn load_decimal_env(key: &str, default: Decimal) -> DaemonResult<Decimal> {
        match env::var(key) {
            Ok(val) => Decimal::from_str(&val)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_parsed_env<T: FromStr>(key: &str, default: T) -> DaemonResult<T> {
        match env::var(key) {
            Ok(val) => val
                .trim()
                .parse::<T>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl LifecycleConfig {
    /// Reject settings that would make every run fail.
    pub fn validate(&self) -> DaemonResult<()> {
        if self.candle_count == 0 {
            return Err(DaemonError::Config("candle count must be at least 1".to_string()));
        }
        if self.fallback_stop_fraction <= Decimal::ZERO || self.fallback_stop_fraction >= Decimal::ONE {
            return Err(DaemonError::Config(format!(
                "fallback stop fraction must be in (0, 1), got {}",
                self.fallback_stop_fraction
            )));
        }
        if self.take_profit_ratio <= Decimal::ZERO || self.take_profit_ratio >= Decimal::ONE {
            return Err(DaemonError::Config(format!(
                "take profit ratio must be in (0, 1), got {}",
                self.take_profit_ratio
            )));
        }
        if self.take_profit_fraction <= Decimal::ZERO || self.take_profit_fraction > Decimal::ONE {
            return Err(DaemonError::Config(format!(
                "take profit fraction must be in (0, 1], got {}",
                self.take_profit_fraction
            )));
        }
        Ok(())
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            entry_poll: Duration::from_secs(1),
            supervise_poll: Duration::from_secs(2),
            candle_interval: "30".to_string(),
            candle_count: 5,
            tick_offset: 5,
            fallback_stop_fraction: Decimal::new(1, 2), // 1%
            take_profit_ratio: Decimal::new(2, 2),      // 2%
            take_profit_fraction: Decimal::new(5, 1),   // half
            stop_trigger: TriggerReference::LastPrice,
            exchange_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            lifecycle: LifecycleConfig::default(),
            exchange: ExchangeConfig {
                credentials: None,
                testnet: true,
            },
            wall_clock: WallClockZone::utc(),
            logging: LoggingConfig::default(),
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.api.port, 8000);
        assert_eq!(config.environment, Environment::Development);
        assert!(config.exchange.testnet);
        assert_eq!(config.exchange.exchange(), Exchange::BybitTestnet);
    }

    #[test]
    fn test_test_config() {
        let config = Config::test();

        assert_eq!(config.api.port, 0);
        assert_eq!(config.environment, Environment::Test);
        assert!(config.lifecycle.supervise_poll < Duration::from_secs(1));
    }

    #[test]
    fn test_lifecycle_defaults() {
        let lifecycle = LifecycleConfig::default();

        assert_eq!(lifecycle.entry_poll, Duration::from_secs(1));
        assert_eq!(lifecycle.supervise_poll, Duration::from_secs(2));
        assert_eq!(lifecycle.candle_count, 5);
        assert_eq!(lifecycle.tick_offset, 5);
        assert_eq!(lifecycle.fallback_stop_fraction, Decimal::new(1, 2));
        assert_eq!(lifecycle.take_profit_fraction, Decimal::new(5, 1));
        assert_eq!(lifecycle.stop_trigger, TriggerReference::LastPrice);
        assert!(lifecycle.validate().is_ok());
    }

    #[test]
    fn test_lifecycle_validation() {
        let mut lifecycle = LifecycleConfig::default();
        lifecycle.take_profit_fraction = Decimal::ZERO;
        assert!(lifecycle.validate().is_err());

        let mut lifecycle = LifecycleConfig::default();
        lifecycle.fallback_stop_fraction = Decimal::ONE;
        assert!(lifecycle.validate().is_err());

        let mut lifecycle = LifecycleConfig::default();
        lifecycle.candle_count = 0;
        assert!(lifecycle.validate().is_err());
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}
