//! Stub venue for tests and the `test` environment.
//!
//! `StubExchange` keeps a signed position per symbol, holds resting limit and
//! stop orders, and journals every call it receives so tests can assert the
//! exact sequence a run produced. Faults can be injected per operation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use goldentime_domain::{OrderSide, Price, Quantity, Symbol, TriggerReference};

use crate::error::{ExecError, ExecResult};
use crate::ports::{ExchangeGateway, ExtremeKind, PlacedOrder};

// =============================================================================
// Journal
// =============================================================================

/// Operation class used for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StubOp {
    Price,
    Candles,
    Instrument,
    MarketOrder,
    LimitOrder,
    ProtectiveStop,
    Cancel,
    PositionSize,
    Balance,
}

/// One call received by the stub, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    GetPrice { symbol: String },
    GetCandleExtrema { symbol: String, interval: String, count: usize, kind: ExtremeKind },
    GetTickSize { symbol: String },
    GetMinOrderQuantity { symbol: String },
    GetQuantityStep { symbol: String },
    MarketOrder { symbol: String, side: OrderSide, quantity: Decimal, reduce_only: bool },
    LimitOrder {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        reduce_only: bool,
    },
    ProtectiveStop { symbol: String, stop_price: Decimal, trigger: TriggerReference },
    CancelOrder { symbol: String, order_id: String },
    GetPositionSize { symbol: String },
    GetBalance { coin: String },
}

impl GatewayCall {
    /// Operation class of this call
    pub fn op(&self) -> StubOp {
        match self {
            GatewayCall::GetPrice { .. } => StubOp::Price,
            GatewayCall::GetCandleExtrema { .. } => StubOp::Candles,
            GatewayCall::GetTickSize { .. }
            | GatewayCall::GetMinOrderQuantity { .. }
            | GatewayCall::GetQuantityStep { .. } => StubOp::Instrument,
            GatewayCall::MarketOrder { .. } => StubOp::MarketOrder,
            GatewayCall::LimitOrder { .. } => StubOp::LimitOrder,
            GatewayCall::ProtectiveStop { .. } => StubOp::ProtectiveStop,
            GatewayCall::CancelOrder { .. } => StubOp::Cancel,
            GatewayCall::GetPositionSize { .. } => StubOp::PositionSize,
            GatewayCall::GetBalance { .. } => StubOp::Balance,
        }
    }

    /// Whether this call can change venue state
    pub fn is_effect(&self) -> bool {
        matches!(
            self.op(),
            StubOp::MarketOrder | StubOp::LimitOrder | StubOp::ProtectiveStop | StubOp::Cancel
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    /// Fail this many more times (`None` = until cleared)
    Fail(Option<u32>),
    /// Never complete
    Hang,
    /// Panic once
    Panic,
}

#[derive(Debug, Clone, PartialEq)]
enum RestingKind {
    Limit { side: OrderSide, quantity: Decimal, price: Decimal },
    Stop { stop_price: Decimal },
}

#[derive(Debug, Clone)]
struct RestingOrder {
    symbol: String,
    kind: RestingKind,
}

// =============================================================================
// Stub Exchange
// =============================================================================

/// In-memory venue.
pub struct StubExchange {
    prices: RwLock<HashMap<String, Decimal>>,
    default_price: Decimal,
    lows: RwLock<Vec<Decimal>>,
    highs: RwLock<Vec<Decimal>>,
    /// (tick size, min qty, qty step)
    instrument: RwLock<(Decimal, Decimal, Decimal)>,
    balances: RwLock<HashMap<String, Decimal>>,
    /// Signed position size by symbol
    positions: RwLock<HashMap<String, Decimal>>,
    resting: RwLock<HashMap<String, RestingOrder>>,
    order_counter: RwLock<u64>,
    faults: RwLock<HashMap<StubOp, Fault>>,
    journal: RwLock<Vec<GatewayCall>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl StubExchange {
    /// Create a stub quoting `default_price` for every symbol.
    ///
    /// Instrument defaults: tick 0.01, min qty 0.001, step 0.001.
    pub fn new(default_price: Decimal) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            default_price,
            lows: RwLock::new(Vec::new()),
            highs: RwLock::new(Vec::new()),
            instrument: RwLock::new((Decimal::new(1, 2), Decimal::new(1, 3), Decimal::new(1, 3))),
            balances: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            resting: RwLock::new(HashMap::new()),
            order_counter: RwLock::new(0),
            faults: RwLock::new(HashMap::new()),
            journal: RwLock::new(Vec::new()),
        }
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Set price for a specific symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        write(&self.prices).insert(symbol.to_uppercase(), price);
    }

    /// Completed-candle lows, oldest first.
    pub fn set_lows(&self, lows: Vec<Decimal>) {
        *write(&self.lows) = lows;
    }

    /// Completed-candle highs, oldest first.
    pub fn set_highs(&self, highs: Vec<Decimal>) {
        *write(&self.highs) = highs;
    }

    /// Instrument filters shared by every symbol.
    pub fn set_instrument(&self, tick_size: Decimal, min_qty: Decimal, qty_step: Decimal) {
        *write(&self.instrument) = (tick_size, min_qty, qty_step);
    }

    pub fn set_balance(&self, coin: &str, amount: Decimal) {
        write(&self.balances).insert(coin.to_uppercase(), amount);
    }

    /// Force a signed position (positive long, negative short).
    pub fn set_position(&self, symbol: &str, signed: Decimal) {
        write(&self.positions).insert(symbol.to_uppercase(), signed);
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    /// Fail the next call of `op`.
    pub fn fail_next(&self, op: StubOp) {
        self.fail_times(op, 1);
    }

    /// Fail the next `times` calls of `op`.
    pub fn fail_times(&self, op: StubOp, times: u32) {
        write(&self.faults).insert(op, Fault::Fail(Some(times)));
    }

    /// Fail every call of `op` until cleared.
    pub fn fail_always(&self, op: StubOp) {
        write(&self.faults).insert(op, Fault::Fail(None));
    }

    /// Never complete calls of `op` until cleared.
    pub fn hang(&self, op: StubOp) {
        write(&self.faults).insert(op, Fault::Hang);
    }

    /// Panic on the next call of `op`.
    pub fn panic_next(&self, op: StubOp) {
        write(&self.faults).insert(op, Fault::Panic);
    }

    /// Remove the fault on `op`.
    pub fn clear_fault(&self, op: StubOp) {
        write(&self.faults).remove(&op);
    }

    // -------------------------------------------------------------------------
    // Inspection and simulation
    // -------------------------------------------------------------------------

    /// Every call received so far.
    pub fn calls(&self) -> Vec<GatewayCall> {
        read(&self.journal).clone()
    }

    /// Calls of a single operation class.
    pub fn calls_of(&self, op: StubOp) -> Vec<GatewayCall> {
        read(&self.journal).iter().filter(|c| c.op() == op).cloned().collect()
    }

    /// Signed position for `symbol`.
    pub fn position(&self, symbol: &str) -> Decimal {
        read(&self.positions).get(&symbol.to_uppercase()).copied().unwrap_or_default()
    }

    /// Ids of resting orders on `symbol`, sorted.
    pub fn open_orders(&self, symbol: &str) -> Vec<String> {
        let symbol = symbol.to_uppercase();
        let mut ids: Vec<String> = read(&self.resting)
            .iter()
            .filter(|(_, order)| order.symbol == symbol)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Limit price or stop price of a resting order.
    pub fn resting_price(&self, order_id: &str) -> Option<Decimal> {
        read(&self.resting).get(order_id).map(|order| match order.kind {
            RestingKind::Limit { price, .. } => price,
            RestingKind::Stop { stop_price } => stop_price,
        })
    }

    /// Simulate the protective stop (or any external close) flattening the position.
    pub fn flatten_position(&self, symbol: &str) {
        self.apply_position(&symbol.to_uppercase(), Decimal::ZERO);
    }

    /// Simulate a resting limit order filling in full.
    pub fn fill_limit(&self, order_id: &str) -> bool {
        let order = write(&self.resting).remove(order_id);
        match order {
            Some(RestingOrder {
                symbol,
                kind: RestingKind::Limit { side, quantity, .. },
            }) => {
                let current = self.position(&symbol);
                let next = match side {
                    OrderSide::Buy => current + quantity,
                    OrderSide::Sell => current - quantity,
                };
                self.apply_position(&symbol, next);
                true
            }
            Some(other) => {
                write(&self.resting).insert(order_id.to_string(), other);
                false
            }
            None => false,
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn next_order_id(&self) -> String {
        let mut counter = write(&self.order_counter);
        *counter += 1;
        format!("STUB-{}", *counter)
    }

    fn price_decimal(&self, symbol: &str) -> Decimal {
        read(&self.prices).get(symbol).copied().unwrap_or(self.default_price)
    }

    /// Set the position; a flat position drops its attached stop.
    fn apply_position(&self, symbol: &str, signed: Decimal) {
        write(&self.positions).insert(symbol.to_string(), signed);
        if signed.is_zero() {
            write(&self.resting).retain(|_, order| {
                !(order.symbol == symbol && matches!(order.kind, RestingKind::Stop { .. }))
            });
        }
    }

    /// Journal the call, then apply any injected fault.
    async fn intercept(&self, call: GatewayCall) -> ExecResult<()> {
        let op = call.op();
        write(&self.journal).push(call);

        let fault = {
            let mut faults = write(&self.faults);
            match faults.get(&op).copied() {
                Some(Fault::Fail(Some(remaining))) => {
                    if remaining <= 1 {
                        faults.remove(&op);
                    } else {
                        faults.insert(op, Fault::Fail(Some(remaining - 1)));
                    }
                    Some(Fault::Fail(Some(remaining)))
                }
                Some(Fault::Panic) => {
                    faults.remove(&op);
                    Some(Fault::Panic)
                }
                other => other,
            }
        };

        match fault {
            None => Ok(()),
            Some(Fault::Fail(_)) => {
                Err(ExecError::Exchange(format!("Simulated {:?} failure", op)))
            }
            Some(Fault::Panic) => panic!("Simulated {:?} panic", op),
            Some(Fault::Hang) => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ExchangeGateway for StubExchange {
    async fn get_price(&self, symbol: &Symbol) -> ExecResult<Price> {
        let symbol = symbol.as_pair();
        self.intercept(GatewayCall::GetPrice { symbol: symbol.clone() }).await?;
        Ok(Price::new(self.price_decimal(&symbol))?)
    }

    async fn get_recent_candle_extrema(
        &self,
        symbol: &Symbol,
        interval: &str,
        count: usize,
        kind: ExtremeKind,
    ) -> ExecResult<Vec<Price>> {
        self.intercept(GatewayCall::GetCandleExtrema {
            symbol: symbol.as_pair(),
            interval: interval.to_string(),
            count,
            kind,
        })
        .await?;

        let series = match kind {
            ExtremeKind::Lows => read(&self.lows).clone(),
            ExtremeKind::Highs => read(&self.highs).clone(),
        };
        let skip = series.len().saturating_sub(count);
        series
            .into_iter()
            .skip(skip)
            .map(|value| Price::new(value).map_err(ExecError::from))
            .collect()
    }

    async fn get_tick_size(&self, symbol: &Symbol) -> ExecResult<Price> {
        self.intercept(GatewayCall::GetTickSize { symbol: symbol.as_pair() }).await?;
        let (tick, _, _) = *read(&self.instrument);
        Ok(Price::new(tick)?)
    }

    async fn get_min_order_quantity(&self, symbol: &Symbol) -> ExecResult<Decimal> {
        self.intercept(GatewayCall::GetMinOrderQuantity { symbol: symbol.as_pair() }).await?;
        Ok(read(&self.instrument).1)
    }

    async fn get_quantity_step(&self, symbol: &Symbol) -> ExecResult<Decimal> {
        self.intercept(GatewayCall::GetQuantityStep { symbol: symbol.as_pair() }).await?;
        Ok(read(&self.instrument).2)
    }

    async fn submit_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Quantity,
        reduce_only: bool,
    ) -> ExecResult<PlacedOrder> {
        let pair = symbol.as_pair();
        self.intercept(GatewayCall::MarketOrder {
            symbol: pair.clone(),
            side,
            quantity: quantity.as_decimal(),
            reduce_only,
        })
        .await?;

        let current = self.position(&pair);
        let requested = match side {
            OrderSide::Buy => quantity.as_decimal(),
            OrderSide::Sell => -quantity.as_decimal(),
        };

        let delta = if reduce_only {
            let reduces = !current.is_zero() && current.is_sign_negative() != requested.is_sign_negative();
            if !reduces {
                return Err(ExecError::OrderRejected(format!(
                    "reduce-only {} {} would not reduce position {}",
                    side, quantity, current
                )));
            }
            let capped = requested.abs().min(current.abs());
            if requested.is_sign_negative() {
                -capped
            } else {
                capped
            }
        } else {
            requested
        };

        self.apply_position(&pair, current + delta);
        let fill = Price::new(self.price_decimal(&pair))?;
        tracing::debug!(symbol = %pair, %side, %quantity, reduce_only, "Stub: market order filled");

        Ok(PlacedOrder {
            order_id: Some(self.next_order_id()),
            fill_price: Some(fill),
        })
    }

    async fn submit_limit_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Quantity,
        price: Price,
        reduce_only: bool,
    ) -> ExecResult<PlacedOrder> {
        let pair = symbol.as_pair();
        self.intercept(GatewayCall::LimitOrder {
            symbol: pair.clone(),
            side,
            quantity: quantity.as_decimal(),
            price: price.as_decimal(),
            reduce_only,
        })
        .await?;

        let order_id = self.next_order_id();
        write(&self.resting).insert(
            order_id.clone(),
            RestingOrder {
                symbol: pair,
                kind: RestingKind::Limit {
                    side,
                    quantity: quantity.as_decimal(),
                    price: price.as_decimal(),
                },
            },
        );
        Ok(PlacedOrder::resting(order_id))
    }

    async fn submit_protective_stop(
        &self,
        symbol: &Symbol,
        stop_price: Price,
        trigger: TriggerReference,
    ) -> ExecResult<PlacedOrder> {
        let pair = symbol.as_pair();
        self.intercept(GatewayCall::ProtectiveStop {
            symbol: pair.clone(),
            stop_price: stop_price.as_decimal(),
            trigger,
        })
        .await?;

        if self.position(&pair).is_zero() {
            return Err(ExecError::OrderRejected(format!("no open position on {} to protect", pair)));
        }

        let order_id = self.next_order_id();
        write(&self.resting).insert(
            order_id.clone(),
            RestingOrder {
                symbol: pair,
                kind: RestingKind::Stop { stop_price: stop_price.as_decimal() },
            },
        );
        Ok(PlacedOrder::resting(order_id))
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> ExecResult<()> {
        self.intercept(GatewayCall::CancelOrder {
            symbol: symbol.as_pair(),
            order_id: order_id.to_string(),
        })
        .await?;

        if write(&self.resting).remove(order_id).is_none() {
            tracing::debug!(order_id, "Stub: cancel of unknown order ignored");
        }
        Ok(())
    }

    async fn get_open_position_size(&self, symbol: &Symbol) -> ExecResult<Decimal> {
        let pair = symbol.as_pair();
        self.intercept(GatewayCall::GetPositionSize { symbol: pair.clone() }).await?;
        Ok(self.position(&pair).abs())
    }

    async fn get_account_balance(&self, coin: &str) -> ExecResult<Decimal> {
        let coin = coin.to_uppercase();
        self.intercept(GatewayCall::GetBalance { coin: coin.clone() }).await?;
        Ok(read(&self.balances).get(&coin).copied().unwrap_or_default())
    }
}

// =============================================================================
// Tests
// =============================================================================
