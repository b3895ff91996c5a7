//! Exchange Credentials Domain Types
//!
//! API credentials are held in memory only, per run. They are never
//! serialized, never logged, and zeroized on drop.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

// =============================================================================
// Exchange Environment
// =============================================================================

/// Venue environment the credentials belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exchange {
    /// Bybit production
    Bybit,
    /// Bybit testnet
    BybitTestnet,
}

impl Exchange {
    /// Pick the environment from the testnet flag
    pub fn from_testnet(testnet: bool) -> Self {
        if testnet {
            Exchange::BybitTestnet
        } else {
            Exchange::Bybit
        }
    }

    /// Get the exchange name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Bybit => "bybit",
            Exchange::BybitTestnet => "bybit_testnet",
        }
    }

    /// Get the base URL for REST calls.
    pub fn base_url(&self) -> &'static str {
        match self {
            Exchange::Bybit => "https://api.bybit.com",
            Exchange::BybitTestnet => "https://api-testnet.bybit.com",
        }
    }
}

// =============================================================================
// API Credentials
// =============================================================================

/// Plaintext API credentials.
///
/// Debug output is redacted. Both fields are wiped when dropped.
#[derive(Clone)]
pub struct ApiCredentials {
    /// API Key (public identifier)
    pub api_key: String,
    /// API Secret
    pub api_secret: zeroize::Zeroizing<String>,
}

impl ApiCredentials {
    /// Create new API credentials.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: zeroize::Zeroizing::new(api_secret.into()),
        }
    }

    /// Both halves present
    pub fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_secret.trim().is_empty()
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hint: String = self.api_key.chars().take(4).collect();
        f.debug_struct("ApiCredentials")
            .field("api_key", &format!("{}***", hint))
            .field("api_secret", &"***")
            .finish()
    }
}

impl Zeroize for ApiCredentials {
    fn zeroize(&mut self) {
        self.api_key.zeroize();
        self.api_secret.zeroize();
    }
}

impl Drop for ApiCredentials {
    fn drop(&mut self) {
        self.zeroize();
    }
}

// =============================================================================
// Tests
// =============================================================================
