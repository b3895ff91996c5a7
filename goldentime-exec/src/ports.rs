//! Execution layer port definitions.
//!
//! `ExchangeGateway` is the only way a trade run reaches the venue. Adapters
//! implement it for a specific venue (Bybit, stub).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use goldentime_domain::{OrderSide, Price, Quantity, Side, Symbol, TriggerReference};

use crate::error::ExecResult;

// =============================================================================
// Exchange Gateway
// =============================================================================

/// Capability set a trade run needs from the venue.
///
/// Implementations:
/// - `StubExchange` - in-memory venue that tracks position size
/// - `BybitRestClient` (goldentime-connectors) - Bybit v5 linear futures
/// - `TimeoutGateway` - wraps another gateway and bounds every call
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Current last-traded price.
    async fn get_price(&self, symbol: &Symbol) -> ExecResult<Price>;

    /// Lows or highs of the `count` most recent completed candles, oldest
    /// first. The in-progress candle is never included.
    async fn get_recent_candle_extrema(
        &self,
        symbol: &Symbol,
        interval: &str,
        count: usize,
        kind: ExtremeKind,
    ) -> ExecResult<Vec<Price>>;

    /// Minimum price increment.
    async fn get_tick_size(&self, symbol: &Symbol) -> ExecResult<Price>;

    /// Minimum order quantity.
    async fn get_min_order_quantity(&self, symbol: &Symbol) -> ExecResult<Decimal>;

    /// Quantity granularity.
    async fn get_quantity_step(&self, symbol: &Symbol) -> ExecResult<Decimal>;

    /// Submit a market order.
    async fn submit_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Quantity,
        reduce_only: bool,
    ) -> ExecResult<PlacedOrder>;

    /// Submit a good-till-cancel limit order.
    async fn submit_limit_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Quantity,
        price: Price,
        reduce_only: bool,
    ) -> ExecResult<PlacedOrder>;

    /// Attach a stop-loss covering the whole open position.
    async fn submit_protective_stop(
        &self,
        symbol: &Symbol,
        stop_price: Price,
        trigger: TriggerReference,
    ) -> ExecResult<PlacedOrder>;

    /// Cancel an order. Missing or already-filled ids are a no-op.
    async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> ExecResult<()>;

    /// Absolute open position size (0 when flat).
    async fn get_open_position_size(&self, symbol: &Symbol) -> ExecResult<Decimal>;

    /// Account balance for `coin`.
    async fn get_account_balance(&self, coin: &str) -> ExecResult<Decimal>;
}

/// Which candle extreme to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtremeKind {
    Lows,
    Highs,
}

impl ExtremeKind {
    /// Lows bound a long's stop, highs bound a short's
    pub fn for_stop(side: Side) -> Self {
        match side {
            Side::Long => ExtremeKind::Lows,
            Side::Short => ExtremeKind::Highs,
        }
    }
}

/// Result of an accepted order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    /// Venue order id, when the venue assigns one
    pub order_id: Option<String>,
    /// Average fill price, when the venue reports it synchronously
    pub fill_price: Option<Price>,
}

impl PlacedOrder {
    /// Accepted order with an id and no fill yet
    pub fn resting(order_id: impl Into<String>) -> Self {
        Self {
            order_id: Some(order_id.into()),
            fill_price: None,
        }
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
    fn test_extreme_kind_for_stop() {
        assert_eq!(ExtremeKind::for_stop(Side::Long), ExtremeKind::Lows);
        assert_eq!(ExtremeKind::for_stop(Side::Short), ExtremeKind::Highs);
    }

    #[test]
    fn test_resting_order_has_no_fill() {
        let placed = PlacedOrder::resting("abc-1");
        assert_eq!(placed.order_id.as_deref(), Some("abc-1"));
        assert!(placed.fill_price.is_none());

        let filled = PlacedOrder {
            order_id: None,
            fill_price: Some(Price::new(dec!(95000)).unwrap()),
        };
        assert_ne!(placed, filled);
    }
}
