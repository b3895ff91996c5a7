//! Validated primitives shared by every crate: prices, quantities, pairs
//! and directions. Constructors reject values a venue would refuse.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain errors for value object and request validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity must be positive
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Symbol must be valid trading pair
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Side must be long or short
    #[error("Invalid side: {0}")]
    InvalidSide(String),

    /// Wall-clock input could not be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Trade request is contradictory or incomplete
    #[error("Invalid trade request: {0}")]
    InvalidRequest(String),

    /// Stop-loss on the wrong side of entry, or equal to it
    #[error("Invalid stop loss: {0}")]
    InvalidStopLoss(String),
}

// =============================================================================
// Price
// =============================================================================

/// Strictly positive price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    /// Fails with `InvalidPrice` for zero or negative input.
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice(format!("Price must be positive, got {}", value)));
        }
        Ok(Self(value))
    }

    /// Raw decimal.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// Strictly positive contract quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Fails with `InvalidQuantity` for zero or negative input.
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(format!(
                "Quantity must be positive, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    /// Raw decimal.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

// =============================================================================
// Symbol
// =============================================================================

/// Linear-futures pair split into base and settlement currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    /// Parse a venue pair such as `BTCUSDT`.
    ///
    /// # Examples
    /// ```
    /// # use goldentime_domain::value_objects::Symbol;
    /// let symbol = Symbol::from_pair("BTCUSDT").unwrap();
    /// assert_eq!(symbol.base(), "BTC");
    /// assert_eq!(symbol.quote(), "USDT");
    /// ```
    ///
    /// Unknown settlement suffixes and empty bases are rejected.
    pub fn from_pair(pair: &str) -> Result<Self, DomainError> {
        // Settlement currencies for linear contracts
        const QUOTE_CURRENCIES: &[&str] = &["USDT", "USDC", "PERP"];

        let pair = pair.trim().to_uppercase();
        for quote in QUOTE_CURRENCIES {
            if let Some(base) = pair.strip_suffix(quote) {
                if !base.is_empty() && base.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Ok(Self {
                        base: base.to_string(),
                        quote: quote.to_string(),
                    });
                }
            }
        }

        Err(DomainError::InvalidSymbol(format!("Cannot parse trading pair: {}", pair)))
    }

    /// Base asset.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Settlement asset.
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Concatenated venue form.
    pub fn as_pair(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_pair())
    }
}

// =============================================================================
// Side
// =============================================================================

/// Direction of the position a run opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order side that opens the position.
    pub fn entry_action(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces the position.
    pub fn exit_action(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }

    /// Signed position delta for a fill of `quantity` on the entry side
    pub fn signed(&self, quantity: Decimal) -> Decimal {
        match self {
            Side::Long => quantity,
            Side::Short => -quantity,
        }
    }
}

impl FromStr for Side {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" | "buy" => Ok(Side::Long),
            "short" | "sell" => Ok(Side::Short),
            other => Err(DomainError::InvalidSide(format!(
                "{}. Expected: long or short",
                other
            ))),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Order direction on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The opposite direction
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "Buy"),
            OrderSide::Sell => write!(f, "Sell"),
        }
    }
}

// =============================================================================
// TriggerReference
// =============================================================================

/// Price series a protective stop triggers on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReference {
    /// Last traded price
    #[default]
    LastPrice,
    /// Mark price
    MarkPrice,
    /// Index price
    IndexPrice,
}

impl TriggerReference {
    /// Venue wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReference::LastPrice => "LastPrice",
            TriggerReference::MarkPrice => "MarkPrice",
            TriggerReference::IndexPrice => "IndexPrice",
        }
    }
}

impl FromStr for TriggerReference {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "last" | "lastprice" => Ok(TriggerReference::LastPrice),
            "mark" | "markprice" => Ok(TriggerReference::MarkPrice),
            "index" | "indexprice" => Ok(TriggerReference::IndexPrice),
            other => Err(DomainError::InvalidRequest(format!(
                "Unknown stop trigger reference: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TriggerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_validation() {
        assert!(Price::new(dec!(100.0)).is_ok());
        assert!(Price::new(dec!(0.01)).is_ok());
        assert!(Price::new(dec!(-1.0)).is_err());
        assert!(Price::new(dec!(0.0)).is_err());
    }

    #[test]
    fn test_price_display_normalizes() {
        let price = Price::new(dec!(99.000)).unwrap();
        assert_eq!(price.to_string(), "99");
    }

    #[test]
    fn test_quantity_validation() {
        assert!(Quantity::new(dec!(0.001)).is_ok());
        assert!(Quantity::new(dec!(100.0)).is_ok());
        assert!(Quantity::new(dec!(-0.1)).is_err());
        assert!(Quantity::new(dec!(0.0)).is_err());
    }

    #[test]
    fn test_symbol_from_pair() {
        let symbol = Symbol::from_pair("BTCUSDT").unwrap();
        assert_eq!(symbol.base(), "BTC");
        assert_eq!(symbol.quote(), "USDT");
        assert_eq!(symbol.as_pair(), "BTCUSDT");
    }

    #[test]
    fn test_symbol_is_case_insensitive() {
        let symbol = Symbol::from_pair("axsusdt").unwrap();
        assert_eq!(symbol.as_pair(), "AXSUSDT");
    }

    #[test]
    fn test_symbol_invalid() {
        assert!(Symbol::from_pair("INVALID").is_err());
        assert!(Symbol::from_pair("USDT").is_err());
        assert!(Symbol::from_pair("").is_err());
        assert!(Symbol::from_pair("BTC-USDT").is_err());
    }

    #[test]
    fn test_side_actions() {
        assert_eq!(Side::Long.entry_action(), OrderSide::Buy);
        assert_eq!(Side::Long.exit_action(), OrderSide::Sell);
        assert_eq!(Side::Short.entry_action(), OrderSide::Sell);
        assert_eq!(Side::Short.exit_action(), OrderSide::Buy);
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
    }

    #[test]
    fn test_side_parse() {
        assert_eq!("long".parse::<Side>().unwrap(), Side::Long);
        assert_eq!("SHORT".parse::<Side>().unwrap(), Side::Short);
        assert_eq!("Buy".parse::<Side>().unwrap(), Side::Long);
        assert!("sideways".parse::<Side>().is_err());
    }

    #[test]
    fn test_trigger_reference_parse() {
        assert_eq!("last".parse::<TriggerReference>().unwrap(), TriggerReference::LastPrice);
        assert_eq!("MarkPrice".parse::<TriggerReference>().unwrap(), TriggerReference::MarkPrice);
        assert!("mid".parse::<TriggerReference>().is_err());
        assert_eq!(TriggerReference::default().as_str(), "LastPrice");
    }
}
