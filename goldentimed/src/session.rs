//! Venue sessions.
//!
//! Each run holds its own gateway handle. Requests without credentials share
//! the process-wide session; requests with credentials get a fresh one.
//! Positions live per account and symbol on the venue, so runs are also
//! keyed by the account their session trades on.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use goldentime_connectors::BybitRestClient;
use goldentime_domain::{ApiCredentials, Exchange};
use goldentime_exec::{ExchangeGateway, TimeoutGateway};

use crate::error::{DaemonError, DaemonResult};

/// Account key of the process-wide session.
pub const SHARED_ACCOUNT: &str = "shared";

/// Hands out the gateway a run talks to.
pub trait GatewayFactory: Send + Sync {
    /// Process-wide session, also used for balance and price passthroughs.
    fn shared(&self) -> Arc<dyn ExchangeGateway>;

    /// Session for one run.
    fn for_run(&self, credentials: Option<&ApiCredentials>) -> DaemonResult<Arc<dyn ExchangeGateway>>;

    /// Venue account the session for `credentials` trades on.
    fn account(&self, credentials: Option<&ApiCredentials>) -> String {
        credentials.map_or_else(|| SHARED_ACCOUNT.to_string(), |c| c.api_key.clone())
    }
}

/// Every run uses the same gateway (single tenant, tests).
pub struct SharedGateway {
    gateway: Arc<dyn ExchangeGateway>,
}

impl SharedGateway {
    pub fn new(gateway: Arc<dyn ExchangeGateway>) -> Self {
        Self { gateway }
    }
}

impl GatewayFactory for SharedGateway {
    fn shared(&self) -> Arc<dyn ExchangeGateway> {
        self.gateway.clone()
    }

    fn for_run(&self, _credentials: Option<&ApiCredentials>) -> DaemonResult<Arc<dyn ExchangeGateway>> {
        Ok(self.gateway.clone())
    }

    fn account(&self, _credentials: Option<&ApiCredentials>) -> String {
        SHARED_ACCOUNT.to_string()
    }
}

/// Bybit sessions, one per credential set.
pub struct BybitSessions {
    shared: Arc<dyn ExchangeGateway>,
    shared_key: Option<String>,
    exchange: Exchange,
    timeout: Duration,
}

impl BybitSessions {
    /// Build the process-wide session from optional default credentials.
    pub fn new(default_credentials: Option<ApiCredentials>, exchange: Exchange, timeout: Duration) -> Self {
        let shared_key = default_credentials.as_ref().map(|c| c.api_key.clone());
        let shared = Self::session(default_credentials, exchange, timeout);
        Self {
            shared,
            shared_key,
            exchange,
            timeout,
        }
    }

    fn session(
        credentials: Option<ApiCredentials>,
        exchange: Exchange,
        timeout: Duration,
    ) -> Arc<dyn ExchangeGateway> {
        let client = BybitRestClient::new(credentials, exchange).with_timeout(timeout);
        Arc::new(TimeoutGateway::new(Arc::new(client), timeout))
    }
}

impl GatewayFactory for BybitSessions {
    fn shared(&self) -> Arc<dyn ExchangeGateway> {
        self.shared.clone()
    }

    fn for_run(&self, credentials: Option<&ApiCredentials>) -> DaemonResult<Arc<dyn ExchangeGateway>> {
        match credentials {
            None => Ok(self.shared.clone()),
            Some(credentials) if !credentials.is_complete() => Err(DaemonError::InvalidRequest(
                "credentials need both api_key and api_secret".to_string(),
            )),
            Some(credentials) => {
                debug!(exchange = self.exchange.as_str(), ?credentials, "Creating per-run session");
                Ok(Self::session(Some(credentials.clone()), self.exchange, self.timeout))
            }
        }
    }

    fn account(&self, credentials: Option<&ApiCredentials>) -> String {
        match (credentials, &self.shared_key) {
            (Some(credentials), _) => credentials.api_key.clone(),
            (None, Some(key)) => key.clone(),
            (None, None) => SHARED_ACCOUNT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goldentime_exec::StubExchange;
    use rust_decimal_macros::dec;

    #[test]
    fn test_shared_gateway_ignores_credentials() {
        let stub: Arc<dyn ExchangeGateway> = Arc::new(StubExchange::new(dec!(100)));
        let factory = SharedGateway::new(stub.clone());
        let credentials = ApiCredentials::new("key", "secret");

        let gateway = factory.for_run(Some(&credentials)).unwrap();
        assert!(Arc::ptr_eq(&gateway, &stub));
    }

    #[test]
    fn test_bybit_sessions_per_credentials() {
        let factory = BybitSessions::new(None, Exchange::BybitTestnet, Duration::from_secs(1));
        let shared = factory.shared();

        let same = factory.for_run(None).unwrap();
        assert!(Arc::ptr_eq(&same, &shared));

        let credentials = ApiCredentials::new("key", "secret");
        let own = factory.for_run(Some(&credentials)).unwrap();
        assert!(!Arc::ptr_eq(&own, &shared));
    }

    #[test]
    fn test_account_keys() {
        let stub: Arc<dyn ExchangeGateway> = Arc::new(StubExchange::new(dec!(100)));
        let shared = SharedGateway::new(stub);
        let credentials = ApiCredentials::new("key-a", "secret");
        assert_eq!(shared.account(Some(&credentials)), SHARED_ACCOUNT);

        let anonymous = BybitSessions::new(None, Exchange::BybitTestnet, Duration::from_secs(1));
        assert_eq!(anonymous.account(None), SHARED_ACCOUNT);
        assert_eq!(anonymous.account(Some(&credentials)), "key-a");

        // Default credentials and the same key supplied per run are one account
        let keyed = BybitSessions::new(
            Some(ApiCredentials::new("key-a", "other")),
            Exchange::BybitTestnet,
            Duration::from_secs(1),
        );
        assert_eq!(keyed.account(None), keyed.account(Some(&credentials)));
    }

    #[test]
    fn test_bybit_sessions_reject_incomplete_credentials() {
        let factory = BybitSessions::new(None, Exchange::BybitTestnet, Duration::from_secs(1));
        let credentials = ApiCredentials::new("key", "  ");

        assert!(matches!(
            factory.for_run(Some(&credentials)),
            Err(DaemonError::InvalidRequest(_))
        ));
    }
}
