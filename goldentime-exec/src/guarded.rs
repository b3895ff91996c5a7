//! Bounded exchange calls.
//!
//! A hung venue call must not stall a poll loop. `TimeoutGateway` wraps any
//! gateway and fails a call with `ExecError::Timeout` once it exceeds the
//! configured budget.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use goldentime_domain::{OrderSide, Price, Quantity, Symbol, TriggerReference};

use crate::error::{ExecError, ExecResult};
use crate::ports::{ExchangeGateway, ExtremeKind, PlacedOrder};

/// Gateway decorator applying a per-call timeout.
pub struct TimeoutGateway {
    inner: Arc<dyn ExchangeGateway>,
    limit: Duration,
}

impl TimeoutGateway {
    pub fn new(inner: Arc<dyn ExchangeGateway>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T: Send>(
        &self,
        operation: &'static str,
        call: impl Future<Output = ExecResult<T>> + Send,
    ) -> ExecResult<T> {
        match timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, limit_ms = self.limit.as_millis() as u64, "Exchange call timed out");
                Err(ExecError::Timeout(format!(
                    "{} did not complete within {:?}",
                    operation, self.limit
                )))
            }
        }
    }
}

#[async_trait]
impl ExchangeGateway for TimeoutGateway {
    async fn get_price(&self, symbol: &Symbol) -> ExecResult<Price> {
        self.bounded("get_price", self.inner.get_price(symbol)).await
    }

    async fn get_recent_candle_extrema(
        &self,
        symbol: &Symbol,
        interval: &str,
        count: usize,
        kind: ExtremeKind,
    ) -> ExecResult<Vec<Price>> {
        self.bounded(
            "get_recent_candle_extrema",
            self.inner.get_recent_candle_extrema(symbol, interval, count, kind),
        )
        .await
    }

    async fn get_tick_size(&self, symbol: &Symbol) -> ExecResult<Price> {
        self.bounded("get_tick_size", self.inner.get_tick_size(symbol)).await
    }

    async fn get_min_order_quantity(&self, symbol: &Symbol) -> ExecResult<Decimal> {
        self.bounded("get_min_order_quantity", self.inner.get_min_order_quantity(symbol))
            .await
    }

    async fn get_quantity_step(&self, symbol: &Symbol) -> ExecResult<Decimal> {
        self.bounded("get_quantity_step", self.inner.get_quantity_step(symbol)).await
    }

    async fn submit_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Quantity,
        reduce_only: bool,
    ) -> ExecResult<PlacedOrder> {
        self.bounded(
            "submit_market_order",
            self.inner.submit_market_order(symbol, side, quantity, reduce_only),
        )
        .await
    }

    async fn submit_limit_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Quantity,
        price: Price,
        reduce_only: bool,
    ) -> ExecResult<PlacedOrder> {
        self.bounded(
            "submit_limit_order",
            self.inner.submit_limit_order(symbol, side, quantity, price, reduce_only),
        )
        .await
    }

    async fn submit_protective_stop(
        &self,
        symbol: &Symbol,
        stop_price: Price,
        trigger: TriggerReference,
    ) -> ExecResult<PlacedOrder> {
        self.bounded(
            "submit_protective_stop",
            self.inner.submit_protective_stop(symbol, stop_price, trigger),
        )
        .await
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> ExecResult<()> {
        self.bounded("cancel_order", self.inner.cancel_order(symbol, order_id)).await
    }

    async fn get_open_position_size(&self, symbol: &Symbol) -> ExecResult<Decimal> {
        self.bounded("get_open_position_size", self.inner.get_open_position_size(symbol))
            .await
    }

    async fn get_account_balance(&self, coin: &str) -> ExecResult<Decimal> {
        self.bounded("get_account_balance", self.inner.get_account_balance(coin)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{StubExchange, StubOp};
    use rust_decimal_macros::dec;

    fn btc() -> Symbol {
        Symbol::from_pair("BTCUSDT").unwrap()
    }

    #[tokio::test]
    async fn test_passes_through_fast_calls() {
        let stub = Arc::new(StubExchange::new(dec!(100)));
        let gateway = TimeoutGateway::new(stub, Duration::from_secs(1));

        let price = gateway.get_price(&btc()).await.unwrap();
        assert_eq!(price.as_decimal(), dec!(100));
    }

    #[tokio::test]
    async fn test_hung_call_times_out() {
        let stub = Arc::new(StubExchange::new(dec!(100)));
        stub.hang(StubOp::PositionSize);
        let gateway = TimeoutGateway::new(stub, Duration::from_millis(20));

        let result = gateway.get_open_position_size(&btc()).await;
        assert!(matches!(result, Err(ExecError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_inner_errors_are_preserved() {
        let stub = Arc::new(StubExchange::new(dec!(100)));
        stub.fail_next(StubOp::Price);
        let gateway = TimeoutGateway::new(stub, Duration::from_secs(1));

        let result = gateway.get_price(&btc()).await;
        assert!(matches!(result, Err(ExecError::Exchange(_))));
    }
}
