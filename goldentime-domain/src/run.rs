//! Trade run state: the mutable record of one lifecycle, and its snapshot.
//!
//! A `TradeRunState` is owned by exactly one lifecycle controller. Everyone
//! else sees `RunSnapshot` copies, published whole on every transition.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::request::{RiskSpec, TradeRequest};
use crate::value_objects::{Price, Quantity, Side, Symbol};

/// Unique identifier for a run
pub type RunId = Uuid;

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a trade run.
///
/// Phases advance strictly forward; none is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "outcome", rename_all = "snake_case")]
pub enum TradePhase {
    /// Constructed, not yet started
    Idle,
    /// Waiting for the entry condition
    AwaitingEntry,
    /// Placing entry and protective orders
    Entering,
    /// Polling for cancellation, scheduled exit and protective fills
    Supervising,
    /// Closing at the scheduled exit time
    ClosingScheduled,
    /// Closing on an external stop request
    ForceClosing,
    /// Terminal
    Closed(CloseOutcome),
}

impl TradePhase {
    /// Get the name of the phase for display
    pub fn name(&self) -> &'static str {
        match self {
            TradePhase::Idle => "idle",
            TradePhase::AwaitingEntry => "awaiting_entry",
            TradePhase::Entering => "entering",
            TradePhase::Supervising => "supervising",
            TradePhase::ClosingScheduled => "closing_scheduled",
            TradePhase::ForceClosing => "force_closing",
            TradePhase::Closed(CloseOutcome::Success) => "closed",
            TradePhase::Closed(CloseOutcome::Cancelled) => "cancelled",
            TradePhase::Closed(CloseOutcome::Error) => "failed",
        }
    }

    /// Check if the phase is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradePhase::Closed(_))
    }
}

impl fmt::Display for TradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseOutcome {
    Success,
    /// Stopped before any order was placed
    Cancelled,
    Error,
}

/// Why the position (if any) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Venue reported zero size: take-profit or stop-loss filled
    ProtectiveFill,
    /// Scheduled exit time reached
    ScheduledExit,
    /// External stop request
    ForcedExit,
    /// Stop request observed before entry fired
    CancelledBeforeEntry,
    /// Run failed and was cleaned up
    Failure,
}

// =============================================================================
// Run State
// =============================================================================

/// Mutable record of a single trade run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRunState {
    pub run_id: RunId,
    pub phase: TradePhase,

    // Request echo
    pub side: Side,
    pub symbol: Symbol,
    pub risk: RiskSpec,
    pub immediate: bool,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: DateTime<Utc>,

    // Resolved at entry
    pub entry_price: Option<Price>,
    pub stop_loss_price: Option<Price>,
    pub take_profit_price: Option<Price>,
    pub stop_loss_rationale: Option<String>,
    pub stop_distance_pct: Option<Decimal>,
    pub quantity: Option<Quantity>,
    pub take_profit_quantity: Option<Quantity>,

    // Orders
    pub entry_order_id: Option<String>,
    pub take_profit_order_id: Option<String>,
    pub stop_loss_order_id: Option<String>,
    pub exit_order_id: Option<String>,

    // Exit
    pub exit_price: Option<Price>,
    pub exit_reason: Option<ExitReason>,

    // Audit
    pub started_at: DateTime<Utc>,
    pub entry_at: Option<DateTime<Utc>>,
    pub exit_at: Option<DateTime<Utc>>,

    /// Protective legs that failed to place (run continues unmonitored on that leg)
    pub degraded: Vec<String>,
    pub last_error: Option<String>,
}

impl TradeRunState {
    /// Create the state for a freshly accepted request
    pub fn new(run_id: RunId, request: &TradeRequest, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            phase: TradePhase::Idle,
            side: request.side,
            symbol: request.symbol.clone(),
            risk: request.risk,
            immediate: request.entry.at().is_none(),
            entry_time: request.entry.at(),
            exit_time: request.exit_at,
            entry_price: None,
            stop_loss_price: None,
            take_profit_price: request.take_profit,
            stop_loss_rationale: None,
            stop_distance_pct: None,
            quantity: None,
            take_profit_quantity: None,
            entry_order_id: None,
            take_profit_order_id: None,
            stop_loss_order_id: None,
            exit_order_id: None,
            exit_price: None,
            exit_reason: None,
            started_at,
            entry_at: None,
            exit_at: None,
            degraded: Vec::new(),
            last_error: None,
        }
    }

    /// Append an error, keeping earlier ones
    pub fn record_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.last_error = Some(match self.last_error.take() {
            Some(previous) => format!("{}; {}", previous, error),
            None => error,
        });
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Immutable, versioned copy of a run's state as seen by readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: RunId,
    /// Incremented on every publish
    pub version: u64,
    pub running: bool,
    pub phase: TradePhase,
    pub info: TradeRunState,
    pub error: Option<String>,
}

impl RunSnapshot {
    /// Capture the state at `version`
    pub fn capture(state: &TradeRunState, version: u64) -> Self {
        Self {
            run_id: state.run_id,
            version,
            running: !state.phase.is_terminal(),
            phase: state.phase,
            info: state.clone(),
            error: state.last_error.clone(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::EntrySchedule;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn sample_state() -> TradeRunState {
        let now = Utc::now();
        let request = TradeRequest {
            side: Side::Short,
            symbol: Symbol::from_pair("ETHUSDT").unwrap(),
            risk: RiskSpec::risk_budget(dec!(5)).unwrap(),
            entry: EntrySchedule::At(now + Duration::minutes(1)),
            exit_at: now + Duration::minutes(6),
            take_profit: None,
            stop_loss: None,
        };
        TradeRunState::new(Uuid::now_v7(), &request, now)
    }

    #[test]
    fn test_new_state_echoes_request() {
        let state = sample_state();
        assert_eq!(state.phase, TradePhase::Idle);
        assert_eq!(state.side, Side::Short);
        assert!(!state.immediate);
        assert!(state.entry_time.is_some());
        assert!(state.entry_price.is_none());
    }

    #[test]
    fn test_terminal_phases() {
        assert!(!TradePhase::Supervising.is_terminal());
        assert!(!TradePhase::ForceClosing.is_terminal());
        assert!(TradePhase::Closed(CloseOutcome::Success).is_terminal());
        assert!(TradePhase::Closed(CloseOutcome::Error).is_terminal());
    }

    #[test]
    fn test_snapshot_running_flag_follows_phase() {
        let mut state = sample_state();
        state.phase = TradePhase::Supervising;
        assert!(RunSnapshot::capture(&state, 3).running);

        state.phase = TradePhase::Closed(CloseOutcome::Error);
        state.record_error("boom");
        let snapshot = RunSnapshot::capture(&state, 4);
        assert!(!snapshot.running);
        assert_eq!(snapshot.error.as_deref(), Some("boom"));
        assert_eq!(snapshot.version, 4);
    }

    #[test]
    fn test_record_error_accumulates() {
        let mut state = sample_state();
        state.record_error("close failed");
        state.record_error("cancel failed");
        assert_eq!(state.last_error.as_deref(), Some("close failed; cancel failed"));
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&TradePhase::Closed(CloseOutcome::Success)).unwrap();
        assert_eq!(json, r#"{"phase":"closed","outcome":"success"}"#);

        let json = serde_json::to_string(&TradePhase::Supervising).unwrap();
        assert_eq!(json, r#"{"phase":"supervising"}"#);
    }
}
