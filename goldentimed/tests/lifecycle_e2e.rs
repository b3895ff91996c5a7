//! E2E tests: a trade run against the in-memory venue on a manual clock.
//!
//! Flow covered:
//! 1. Immediate entry, derived stop, fixed-risk sizing
//! 2. Protective fill, scheduled exit, forced exit
//! 3. Injected failures and panics: every path ends in a terminal phase
//!    with no residual position and no standing protective order

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use goldentime_domain::{
    CloseOutcome, EntrySchedule, ExitReason, OrderSide, RiskSpec, RunSnapshot, Side, Symbol,
    TradePhase, TradeRequest, TriggerReference,
};
use goldentime_exec::{GatewayCall, ManualClock, StubExchange, StubOp};
use goldentimed::{LifecycleConfig, TradeLifecycleController};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// =============================================================================
// Fixtures
// =============================================================================

const BTC: &str = "BTCUSDT";

fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn exit_at() -> DateTime<Utc> {
    start() + Duration::minutes(10)
}

/// Price 100, lows [95, 97, 96, 94, 98], tick 1, lot 0.001 / 0.001.
fn venue() -> Arc<StubExchange> {
    let stub = Arc::new(StubExchange::new(dec!(100)));
    stub.set_lows(vec![dec!(95), dec!(97), dec!(96), dec!(94), dec!(98)]);
    stub.set_instrument(dec!(1), dec!(0.001), dec!(0.001));
    stub
}

fn long_with_budget(budget: Decimal) -> TradeRequest {
    TradeRequest {
        side: Side::Long,
        symbol: Symbol::from_pair(BTC).unwrap(),
        risk: RiskSpec::risk_budget(budget).unwrap(),
        entry: EntrySchedule::Immediate,
        exit_at: exit_at(),
        take_profit: None,
        stop_loss: None,
    }
}

struct Harness {
    stub: Arc<StubExchange>,
    clock: Arc<ManualClock>,
    cancel: CancellationToken,
}

impl Harness {
    fn new(stub: Arc<StubExchange>) -> Self {
        Self {
            stub,
            clock: Arc::new(ManualClock::new(start())),
            cancel: CancellationToken::new(),
        }
    }

    async fn run(&self, request: TradeRequest) -> RunSnapshot {
        let (controller, _snapshots) = TradeLifecycleController::new(
            Uuid::now_v7(),
            request,
            self.stub.clone(),
            self.clock.clone(),
            LifecycleConfig::default(),
            self.cancel.clone(),
        );
        controller.run().await
    }

    fn effects(&self) -> Vec<GatewayCall> {
        self.stub.calls().into_iter().filter(GatewayCall::is_effect).collect()
    }

    fn assert_flat(&self) {
        assert_eq!(self.stub.position(BTC), Decimal::ZERO, "residual position");
        assert!(self.stub.open_orders(BTC).is_empty(), "standing orders");
    }
}

// =============================================================================
// Happy paths
// =============================================================================

#[tokio::test]
async fn test_fixed_risk_long_closed_by_protective_fill() {
    let harness = Harness::new(venue());

    // Stop-loss hits one minute in
    let stub = harness.stub.clone();
    harness
        .clock
        .on_reach(start() + Duration::minutes(1), move || stub.flatten_position(BTC));

    let snapshot = harness.run(long_with_budget(dec!(2))).await;

    assert_eq!(snapshot.phase, TradePhase::Closed(CloseOutcome::Success));
    assert!(!snapshot.running);
    assert!(snapshot.error.is_none());

    let info = &snapshot.info;
    assert_eq!(info.entry_price.unwrap().as_decimal(), dec!(100));
    assert_eq!(info.stop_loss_price.unwrap().as_decimal(), dec!(99));
    assert_eq!(info.stop_distance_pct, Some(dec!(1)));
    assert_eq!(info.quantity.unwrap().as_decimal(), dec!(2));
    assert_eq!(info.exit_reason, Some(ExitReason::ProtectiveFill));
    assert!(info.exit_at.unwrap() >= start() + Duration::minutes(1));
    assert!(info.stop_loss_rationale.as_deref().unwrap().contains("fallback"));

    let tp_id = info.take_profit_order_id.clone().unwrap();
    let sl_id = info.stop_loss_order_id.clone().unwrap();
    assert_eq!(
        harness.effects(),
        vec![
            GatewayCall::MarketOrder {
                symbol: BTC.to_string(),
                side: OrderSide::Buy,
                quantity: dec!(2),
                reduce_only: false,
            },
            GatewayCall::LimitOrder {
                symbol: BTC.to_string(),
                side: OrderSide::Sell,
                quantity: dec!(1),
                price: dec!(102),
                reduce_only: true,
            },
            GatewayCall::ProtectiveStop {
                symbol: BTC.to_string(),
                stop_price: dec!(99),
                trigger: TriggerReference::LastPrice,
            },
            GatewayCall::CancelOrder { symbol: BTC.to_string(), order_id: tp_id },
            GatewayCall::CancelOrder { symbol: BTC.to_string(), order_id: sl_id },
        ]
    );
    harness.assert_flat();
}

#[tokio::test]
async fn test_take_profit_then_stop() {
    let harness = Harness::new(venue());

    let stub = harness.stub.clone();
    harness.clock.on_reach(start() + Duration::minutes(1), move || {
        assert!(stub.fill_limit("STUB-2"));
    });
    let stub = harness.stub.clone();
    harness
        .clock
        .on_reach(start() + Duration::minutes(3), move || stub.flatten_position(BTC));

    let snapshot = harness.run(long_with_budget(dec!(2))).await;

    assert_eq!(snapshot.phase, TradePhase::Closed(CloseOutcome::Success));
    assert_eq!(snapshot.info.exit_reason, Some(ExitReason::ProtectiveFill));
    assert!(snapshot.info.exit_at.unwrap() >= start() + Duration::minutes(3));
    harness.assert_flat();
}

#[tokio::test]
async fn test_scheduled_exit_closes_remaining_position() {
    let harness = Harness::new(venue());

    let snapshot = harness.run(long_with_budget(dec!(2))).await;

    assert_eq!(snapshot.phase, TradePhase::Closed(CloseOutcome::Success));
    assert_eq!(snapshot.info.exit_reason, Some(ExitReason::ScheduledExit));
    assert!(snapshot.info.exit_at.unwrap() >= exit_at());
    assert_eq!(snapshot.info.exit_price.unwrap().as_decimal(), dec!(100));

    let closes: Vec<GatewayCall> = harness.stub.calls_of(StubOp::MarketOrder);
    assert_eq!(closes.len(), 2);
    assert!(matches!(
        &closes[1],
        GatewayCall::MarketOrder { side: OrderSide::Sell, reduce_only: true, quantity, .. }
            if *quantity == dec!(2)
    ));
    harness.assert_flat();
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancellation_preempts_scheduled_exit() {
    let harness = Harness::new(venue());

    // Stop request lands on the same tick the exit time is reached
    let token = harness.cancel.clone();
    harness.clock.on_reach(exit_at(), move || token.cancel());

    let snapshot = harness.run(long_with_budget(dec!(2))).await;

    assert_eq!(snapshot.phase, TradePhase::Closed(CloseOutcome::Success));
    assert_eq!(snapshot.info.exit_reason, Some(ExitReason::ForcedExit));

    // ForceClosing: size query, reduce-only close for exactly that size, then both cancels
    let calls = harness.stub.calls();
    let tail: Vec<StubOp> = calls[calls.len() - 4..].iter().map(GatewayCall::op).collect();
    assert_eq!(
        tail,
        vec![StubOp::PositionSize, StubOp::MarketOrder, StubOp::Cancel, StubOp::Cancel]
    );
    assert!(matches!(
        &calls[calls.len() - 3],
        GatewayCall::MarketOrder { side: OrderSide::Sell, reduce_only: true, quantity, .. }
            if *quantity == dec!(2)
    ));
    harness.assert_flat();
}

#[tokio::test]
async fn test_force_close_with_failing_cancels_reports_error() {
    let harness = Harness::new(venue());
    harness.stub.fail_always(StubOp::Cancel);

    let token = harness.cancel.clone();
    harness
        .clock
        .on_reach(start() + Duration::minutes(2), move || token.cancel());

    let snapshot = harness.run(long_with_budget(dec!(2))).await;

    assert_eq!(snapshot.phase, TradePhase::Closed(CloseOutcome::Error));
    assert!(!snapshot.running);
    assert!(snapshot.error.unwrap().contains("cancel"));
    // Close still happened before the cancels were attempted
    assert_eq!(harness.stub.position(BTC), Decimal::ZERO);
    assert_eq!(harness.stub.calls_of(StubOp::Cancel).len(), 2);
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_supervision_failures_still_terminate() {
    for failures in [1u32, 7, 120, 10_000] {
        let harness = Harness::new(venue());
        harness.stub.fail_times(StubOp::PositionSize, failures);

        let snapshot = harness.run(long_with_budget(dec!(2))).await;

        assert!(snapshot.phase.is_terminal(), "failures = {}", failures);
        assert_eq!(snapshot.phase, TradePhase::Closed(CloseOutcome::Success));
        harness.assert_flat();
    }
}

#[tokio::test]
async fn test_position_query_never_answers() {
    let harness = Harness::new(venue());
    harness.stub.fail_always(StubOp::PositionSize);

    let snapshot = harness.run(long_with_budget(dec!(2))).await;

    // Scheduled close falls back to the recorded quantity
    assert_eq!(snapshot.phase, TradePhase::Closed(CloseOutcome::Success));
    assert_eq!(snapshot.info.exit_reason, Some(ExitReason::ScheduledExit));
    harness.assert_flat();
}

#[tokio::test]
async fn test_panic_during_supervision_is_cleaned_up() {
    let harness = Harness::new(venue());
    harness.stub.panic_next(StubOp::PositionSize);

    let snapshot = harness.run(long_with_budget(dec!(2))).await;

    assert_eq!(snapshot.phase, TradePhase::Closed(CloseOutcome::Error));
    assert_eq!(snapshot.info.exit_reason, Some(ExitReason::Failure));
    assert!(snapshot.error.unwrap().contains("panicked"));
    harness.assert_flat();
}

#[tokio::test]
async fn test_entry_order_failure_is_not_retried() {
    let harness = Harness::new(venue());
    harness.stub.fail_next(StubOp::MarketOrder);

    let snapshot = harness.run(long_with_budget(dec!(2))).await;

    assert_eq!(snapshot.phase, TradePhase::Closed(CloseOutcome::Error));
    assert!(!snapshot.running);
    assert!(snapshot.error.is_some());
    assert_eq!(harness.stub.calls_of(StubOp::MarketOrder).len(), 1);
    assert!(harness.stub.calls_of(StubOp::LimitOrder).is_empty());
    harness.assert_flat();
}

#[tokio::test]
async fn test_failure_before_entry_leaves_foreign_position_alone() {
    let stub = venue();
    stub.set_position(BTC, dec!(5));
    stub.fail_next(StubOp::Candles);
    let harness = Harness::new(stub);

    let snapshot = harness.run(long_with_budget(dec!(2))).await;

    assert_eq!(snapshot.phase, TradePhase::Closed(CloseOutcome::Error));
    assert_eq!(harness.stub.position(BTC), dec!(5));
    assert!(harness.effects().is_empty());
}

#[tokio::test]
async fn test_no_adverse_level_uses_fallback_stop() {
    let stub = venue();
    // Every level sits at entry, so no adverse candidate; fallback applies
    stub.set_lows(vec![dec!(100)]);
    let harness = Harness::new(stub);

    let snapshot = harness.run(long_with_budget(dec!(2))).await;

    assert_eq!(snapshot.info.stop_loss_price.unwrap().as_decimal(), dec!(99));
    assert_eq!(snapshot.phase, TradePhase::Closed(CloseOutcome::Success));
    harness.assert_flat();
}
