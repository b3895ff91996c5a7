//! Trade lifecycle controller.
//!
//! Drives one trade run through its phases:
//!
//! ```text
//! Idle → AwaitingEntry → Entering → Supervising ─┬→ Closed(Success)   (protective fill)
//!             │                                  ├→ ClosingScheduled → Closed
//!             └→ Closed(Cancelled)               └→ ForceClosing     → Closed
//! ```
//!
//! The controller exclusively owns its `TradeRunState`. Every transition
//! publishes a whole `RunSnapshot` through a watch channel; readers never see
//! a half-updated state. Any error or panic escaping a phase triggers cleanup
//! (close the position this run opened, cancel its protective orders) before
//! the run reaches `Closed(Error)`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use goldentime_domain::{
    CloseOutcome, ExitReason, Price, Quantity, RiskSpec, RunId, RunSnapshot, Side, TradePhase,
    TradeRequest, TradeRunState,
};
use goldentime_engine::{
    adjust_quantity, compute_quantity_from_risk, snap_to_tick, LotSizeFilter, PriceLevelAnalyzer,
};
use goldentime_exec::{ExchangeGateway, ExtremeKind, SupervisorClock};

use crate::config::LifecycleConfig;
use crate::error::{DaemonError, DaemonResult};

/// How supervision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisionExit {
    /// Venue reports no remaining position
    ProtectiveFill,
    /// Scheduled exit time reached
    Scheduled,
    /// Stop requested
    Cancelled,
}

/// Owns and drives a single trade run.
pub struct TradeLifecycleController {
    request: TradeRequest,
    state: TradeRunState,
    gateway: Arc<dyn ExchangeGateway>,
    clock: Arc<dyn SupervisorClock>,
    config: LifecycleConfig,
    cancel: CancellationToken,
    publisher: watch::Sender<RunSnapshot>,
    version: u64,
    /// Set once the entry market order has been submitted
    entry_attempted: bool,
}

impl TradeLifecycleController {
    /// Create a controller in `Idle`, returning the receiver for its snapshots.
    pub fn new(
        run_id: RunId,
        request: TradeRequest,
        gateway: Arc<dyn ExchangeGateway>,
        clock: Arc<dyn SupervisorClock>,
        config: LifecycleConfig,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<RunSnapshot>) {
        let state = TradeRunState::new(run_id, &request, clock.now());
        let (publisher, receiver) = watch::channel(RunSnapshot::capture(&state, 0));

        let controller = Self {
            request,
            state,
            gateway,
            clock,
            config,
            cancel,
            publisher,
            version: 0,
            entry_attempted: false,
        };
        (controller, receiver)
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot::capture(&self.state, self.version)
    }

    /// Run to a terminal phase and return the final snapshot.
    ///
    /// Never returns with a non-terminal phase: errors and panics are caught,
    /// cleaned up and reported as `Closed(Error)`.
    pub async fn run(mut self) -> RunSnapshot {
        info!(
            run_id = %self.state.run_id,
            symbol = %self.request.symbol,
            side = %self.request.side,
            exit_at = %self.request.exit_at,
            "Trade run started"
        );

        let outcome = AssertUnwindSafe(self.drive()).catch_unwind().await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(payload) => Some(DaemonError::Panicked(panic_message(payload.as_ref()))),
        };

        if let Some(e) = failure {
            error!(
                run_id = %self.state.run_id,
                phase = %self.state.phase,
                error = %e,
                "Trade run failed, cleaning up"
            );
            self.state.record_error(e.to_string());

            let cleanup = AssertUnwindSafe(self.cleanup_after_failure()).catch_unwind().await;
            if let Err(payload) = cleanup {
                self.state
                    .record_error(format!("cleanup panicked: {}", panic_message(payload.as_ref())));
            }

            self.state.exit_reason = Some(ExitReason::Failure);
            if self.state.exit_at.is_none() && self.entry_attempted {
                self.state.exit_at = Some(self.clock.now());
            }
            self.transition(TradePhase::Closed(CloseOutcome::Error));
        }

        info!(
            run_id = %self.state.run_id,
            phase = %self.state.phase,
            exit_reason = ?self.state.exit_reason,
            "Trade run finished"
        );
        self.snapshot()
    }

    async fn drive(&mut self) -> DaemonResult<()> {
        self.transition(TradePhase::AwaitingEntry);

        if !self.await_entry().await {
            info!(run_id = %self.state.run_id, "Stop requested before entry");
            self.state.exit_reason = Some(ExitReason::CancelledBeforeEntry);
            self.transition(TradePhase::Closed(CloseOutcome::Cancelled));
            return Ok(());
        }

        self.transition(TradePhase::Entering);
        self.enter().await?;

        self.transition(TradePhase::Supervising);
        match self.supervise().await {
            SupervisionExit::ProtectiveFill => self.finish_after_fill().await,
            SupervisionExit::Scheduled => {
                self.transition(TradePhase::ClosingScheduled);
                self.close_scheduled().await?;
            }
            SupervisionExit::Cancelled => {
                self.transition(TradePhase::ForceClosing);
                self.force_close().await;
            }
        }

        Ok(())
    }

    // =========================================================================
    // AwaitingEntry
    // =========================================================================

    /// Returns `false` if a stop was requested first.
    async fn await_entry(&self) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            if self.request.entry.is_due(self.clock.now()) {
                return true;
            }
            self.pause(self.config.entry_poll).await;
        }
    }

    // =========================================================================
    // Entering
    // =========================================================================

    async fn enter(&mut self) -> DaemonResult<()> {
        let symbol = self.request.symbol.clone();
        let side = self.request.side;

        let entry_price = self.gateway.get_price(&symbol).await?;
        self.state.entry_price = Some(entry_price);
        let tick_size = self.gateway.get_tick_size(&symbol).await?;

        let stop_loss = match self.request.stop_loss {
            Some(explicit) => self.accept_explicit_stop(entry_price, explicit)?,
            None => self.derive_stop(entry_price, tick_size).await?,
        };

        let take_profit = match self.request.take_profit {
            Some(explicit) => explicit,
            None => default_take_profit(entry_price, side, self.config.take_profit_ratio, tick_size)?,
        };
        self.state.take_profit_price = Some(take_profit);

        let lot = LotSizeFilter::new(
            self.gateway.get_min_order_quantity(&symbol).await?,
            self.gateway.get_quantity_step(&symbol).await?,
        )?;
        let raw = match self.request.risk {
            RiskSpec::FixedQuantity(quantity) => quantity.as_decimal(),
            RiskSpec::RiskBudget(budget) => {
                compute_quantity_from_risk(budget, entry_price, stop_loss)?
            }
        };
        let quantity = adjust_quantity(raw, &lot)?;
        self.state.quantity = Some(quantity);

        info!(
            run_id = %self.state.run_id,
            %symbol,
            entry = %entry_price,
            stop_loss = %stop_loss,
            take_profit = %take_profit,
            %quantity,
            "Entry plan resolved"
        );
        self.publish();

        self.entry_attempted = true;
        let placed = self
            .gateway
            .submit_market_order(&symbol, side.entry_action(), quantity, false)
            .await?;
        self.state.entry_order_id = placed.order_id.clone();
        self.state.entry_at = Some(self.clock.now());
        info!(
            run_id = %self.state.run_id,
            order_id = ?placed.order_id,
            fill_price = ?placed.fill_price.map(|p| p.as_decimal()),
            "Entry order filled"
        );
        self.publish();

        self.place_take_profit(quantity, take_profit, &lot).await;
        self.place_stop_loss(stop_loss).await;
        Ok(())
    }

    fn accept_explicit_stop(&mut self, entry: Price, stop: Price) -> DaemonResult<Price> {
        let distance = match self.request.side {
            Side::Long => entry.as_decimal() - stop.as_decimal(),
            Side::Short => stop.as_decimal() - entry.as_decimal(),
        };
        if distance <= Decimal::ZERO {
            return Err(DaemonError::InvalidRequest(format!(
                "stop loss {} is on the wrong side of {} entry at {}",
                stop, self.request.side, entry
            )));
        }

        let pct = distance / entry.as_decimal() * Decimal::ONE_HUNDRED;
        self.state.stop_loss_price = Some(stop);
        self.state.stop_distance_pct = Some(pct);
        self.state.stop_loss_rationale = Some(format!(
            "explicit stop loss {} ({}% from entry)",
            stop,
            pct.round_dp(2)
        ));
        Ok(stop)
    }

    async fn derive_stop(&mut self, entry: Price, tick_size: Price) -> DaemonResult<Price> {
        let symbol = &self.request.symbol;
        let side = self.request.side;

        let levels = self
            .gateway
            .get_recent_candle_extrema(
                symbol,
                &self.config.candle_interval,
                self.config.candle_count,
                ExtremeKind::for_stop(side),
            )
            .await?;

        let derivation = PriceLevelAnalyzer.derive_stop_loss(
            &levels,
            entry,
            side,
            tick_size,
            self.config.tick_offset,
            self.config.fallback_stop_fraction,
        )?;

        let stop_loss = Price::new(snap_to_tick(
            derivation.stop_loss.as_decimal(),
            tick_size.as_decimal(),
            entry.as_decimal(),
        ))?;
        let distance = (entry.as_decimal() - stop_loss.as_decimal()).abs();

        debug!(
            run_id = %self.state.run_id,
            basis = ?derivation.basis,
            rationale = %derivation.rationale,
            derived = %derivation.stop_loss,
            %stop_loss,
            "Stop loss derived"
        );
        self.state.stop_loss_price = Some(stop_loss);
        self.state.stop_distance_pct = Some(distance / entry.as_decimal() * Decimal::ONE_HUNDRED);
        self.state.stop_loss_rationale = Some(derivation.rationale);
        Ok(stop_loss)
    }

    async fn place_take_profit(&mut self, quantity: Quantity, price: Price, lot: &LotSizeFilter) {
        let portion = match adjust_quantity(quantity.as_decimal() * self.config.take_profit_fraction, lot) {
            Ok(portion) => portion.min(quantity),
            Err(e) => {
                self.degrade("take_profit", e.to_string());
                return;
            }
        };

        match self
            .gateway
            .submit_limit_order(&self.request.symbol, self.request.side.exit_action(), portion, price, true)
            .await
        {
            Ok(placed) => {
                info!(
                    run_id = %self.state.run_id,
                    order_id = ?placed.order_id,
                    %price,
                    quantity = %portion,
                    "Take profit placed"
                );
                self.state.take_profit_order_id = placed.order_id;
                self.state.take_profit_quantity = Some(portion);
            }
            Err(e) => self.degrade("take_profit", e.to_string()),
        }
    }

    async fn place_stop_loss(&mut self, stop: Price) {
        match self
            .gateway
            .submit_protective_stop(&self.request.symbol, stop, self.config.stop_trigger)
            .await
        {
            Ok(placed) => {
                info!(
                    run_id = %self.state.run_id,
                    order_id = ?placed.order_id,
                    stop_price = %stop,
                    trigger = self.config.stop_trigger.as_str(),
                    "Stop loss placed"
                );
                self.state.stop_loss_order_id = placed.order_id;
            }
            Err(e) => self.degrade("stop_loss", e.to_string()),
        }
    }

    /// A protective leg failed to place; the run continues without it.
    fn degrade(&mut self, leg: &str, reason: String) {
        warn!(run_id = %self.state.run_id, leg, %reason, "Protective order not placed, leg unmonitored");
        self.state.degraded.push(format!("{}: {}", leg, reason));
    }

    // =========================================================================
    // Supervising
    // =========================================================================

    /// Poll until cancellation, exit time or a flat position, in that priority.
    async fn supervise(&mut self) -> SupervisionExit {
        loop {
            if self.cancel.is_cancelled() {
                return SupervisionExit::Cancelled;
            }
            if self.clock.now() >= self.request.exit_at {
                return SupervisionExit::Scheduled;
            }

            match self.gateway.get_open_position_size(&self.request.symbol).await {
                Ok(size) if size.is_zero() => return SupervisionExit::ProtectiveFill,
                Ok(size) => debug!(run_id = %self.state.run_id, %size, "Position open"),
                Err(e) => warn!(
                    run_id = %self.state.run_id,
                    error = %e,
                    "Position query failed, retrying next poll"
                ),
            }

            self.pause(self.config.supervise_poll).await;
        }
    }

    async fn finish_after_fill(&mut self) {
        info!(run_id = %self.state.run_id, "Position closed by protective order");
        self.state.exit_reason = Some(ExitReason::ProtectiveFill);
        self.state.exit_price = self.current_price().await;
        self.state.exit_at = Some(self.clock.now());
        self.cancel_protective_orders().await;
        self.transition(TradePhase::Closed(CloseOutcome::Success));
    }

    // =========================================================================
    // Closing
    // =========================================================================

    async fn close_scheduled(&mut self) -> DaemonResult<()> {
        let remaining = self.remaining_size().await;

        if remaining.is_zero() {
            info!(run_id = %self.state.run_id, "Position already flat at exit time");
            self.state.exit_reason = Some(ExitReason::ProtectiveFill);
            self.state.exit_price = self.current_price().await;
            self.state.exit_at = Some(self.clock.now());
        } else {
            self.close_position(remaining).await?;
            self.state.exit_reason = Some(ExitReason::ScheduledExit);
        }

        self.cancel_protective_orders().await;
        self.transition(TradePhase::Closed(CloseOutcome::Success));
        Ok(())
    }

    async fn force_close(&mut self) {
        let clean = self.flatten().await;
        self.state.exit_reason = Some(ExitReason::ForcedExit);
        if self.state.exit_at.is_none() {
            self.state.exit_at = Some(self.clock.now());
        }

        let outcome = if clean {
            CloseOutcome::Success
        } else {
            CloseOutcome::Error
        };
        self.transition(TradePhase::Closed(outcome));
    }

    async fn cleanup_after_failure(&mut self) {
        if self.entry_attempted {
            self.flatten().await;
        } else {
            self.cancel_protective_orders().await;
        }
    }

    /// Close whatever is open, then cancel both protective orders.
    ///
    /// Every step is attempted; returns `false` if any failed.
    async fn flatten(&mut self) -> bool {
        let mut clean = true;

        let remaining = self.remaining_size().await;
        if !remaining.is_zero() {
            if let Err(e) = self.close_position(remaining).await {
                error!(run_id = %self.state.run_id, error = %e, "Close failed");
                self.state.record_error(format!("close failed: {}", e));
                clean = false;
            }
        }

        if !self.cancel_protective_orders().await {
            clean = false;
        }
        clean
    }

    /// Venue size, or the size recorded at entry if the venue cannot answer.
    async fn remaining_size(&self) -> Decimal {
        match self.gateway.get_open_position_size(&self.request.symbol).await {
            Ok(size) => size,
            Err(e) => {
                let recorded = self
                    .state
                    .quantity
                    .map(|q| q.as_decimal())
                    .unwrap_or(Decimal::ZERO);
                warn!(
                    run_id = %self.state.run_id,
                    error = %e,
                    %recorded,
                    "Position query failed, using recorded quantity"
                );
                recorded
            }
        }
    }

    /// Reduce-only market close of `size`.
    async fn close_position(&mut self, size: Decimal) -> DaemonResult<()> {
        let quantity = Quantity::new(size)?;
        let placed = self
            .gateway
            .submit_market_order(
                &self.request.symbol,
                self.request.side.exit_action(),
                quantity,
                true,
            )
            .await?;

        self.state.exit_order_id = placed.order_id.clone();
        self.state.exit_price = match placed.fill_price {
            Some(fill) => Some(fill),
            None => self.current_price().await,
        };
        self.state.exit_at = Some(self.clock.now());

        info!(
            run_id = %self.state.run_id,
            order_id = ?placed.order_id,
            %quantity,
            exit_price = ?self.state.exit_price.map(|p| p.as_decimal()),
            "Position closed"
        );
        self.publish();
        Ok(())
    }

    /// Cancel the recorded take-profit and stop-loss orders.
    ///
    /// Returns `false` if any cancellation failed; failures are recorded.
    async fn cancel_protective_orders(&mut self) -> bool {
        let standing: Vec<String> = [
            self.state.take_profit_order_id.clone(),
            self.state.stop_loss_order_id.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mut clean = true;
        for order_id in standing {
            match self.gateway.cancel_order(&self.request.symbol, &order_id).await {
                Ok(()) => debug!(run_id = %self.state.run_id, %order_id, "Protective order cancelled"),
                Err(e) => {
                    warn!(run_id = %self.state.run_id, %order_id, error = %e, "Cancel failed");
                    self.state.record_error(format!("cancel {} failed: {}", order_id, e));
                    clean = false;
                }
            }
        }
        clean
    }

    async fn current_price(&self) -> Option<Price> {
        match self.gateway.get_price(&self.request.symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!(run_id = %self.state.run_id, error = %e, "Exit price unavailable");
                None
            }
        }
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    /// Sleep one poll interval, waking early on a stop request.
    async fn pause(&self, period: Duration) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.clock.sleep(period) => {}
        }
    }

    fn transition(&mut self, next: TradePhase) {
        let previous = self.state.phase;
        self.state.phase = next;
        info!(
            run_id = %self.state.run_id,
            symbol = %self.request.symbol,
            from = %previous,
            to = %next,
            "Phase transition"
        );
        self.publish();
    }

    fn publish(&mut self) {
        self.version += 1;
        self.publisher
            .send_replace(RunSnapshot::capture(&self.state, self.version));
    }
}

/// `entry × (1 ± ratio)` at 8 decimal places, then onto the tick grid toward entry.
fn default_take_profit(entry: Price, side: Side, ratio: Decimal, tick_size: Price) -> DaemonResult<Price> {
    let factor = match side {
        Side::Long => Decimal::ONE + ratio,
        Side::Short => Decimal::ONE - ratio,
    };
    let raw = (entry.as_decimal() * factor).round_dp(8);
    Ok(Price::new(snap_to_tick(raw, tick_size.as_decimal(), entry.as_decimal()))?)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
