//! Trade request: the immutable input of a single trade cycle.
//!
//! A request is validated before any exchange call is made. Input errors never
//! reach the lifecycle controller.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::{DomainError, Price, Quantity, Side, Symbol};

// =============================================================================
// Risk Specification
// =============================================================================

/// How the order quantity is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RiskSpec {
    /// Trade exactly this quantity (still lot-adjusted)
    FixedQuantity(Quantity),
    /// Size the position so a stop-out loses this much quote currency
    RiskBudget(Decimal),
}

impl RiskSpec {
    /// Build a risk-budget spec.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRequest` if the budget is not positive.
    pub fn risk_budget(budget: Decimal) -> Result<Self, DomainError> {
        if budget <= Decimal::ZERO {
            return Err(DomainError::InvalidRequest(format!(
                "Risk budget must be positive, got {}",
                budget
            )));
        }
        Ok(RiskSpec::RiskBudget(budget))
    }

    /// Build a fixed-quantity spec.
    pub fn fixed_quantity(quantity: Decimal) -> Result<Self, DomainError> {
        Ok(RiskSpec::FixedQuantity(Quantity::new(quantity)?))
    }
}

// =============================================================================
// Entry Schedule
// =============================================================================

/// When the entry order fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum EntrySchedule {
    /// Enter on the first poll
    Immediate,
    /// Enter once the clock reaches this instant
    At(DateTime<Utc>),
}

impl EntrySchedule {
    /// Combine the two wire fields into a schedule.
    ///
    /// `immediate` and an explicit entry time are mutually exclusive, and one
    /// of them is required.
    pub fn from_parts(
        immediate: bool,
        entry_at: Option<DateTime<Utc>>,
    ) -> Result<Self, DomainError> {
        match (immediate, entry_at) {
            (true, None) => Ok(EntrySchedule::Immediate),
            (false, Some(at)) => Ok(EntrySchedule::At(at)),
            (true, Some(_)) => Err(DomainError::InvalidRequest(
                "immediate entry and an explicit entry time are mutually exclusive".to_string(),
            )),
            (false, None) => Err(DomainError::InvalidRequest(
                "either immediate entry or an entry time is required".to_string(),
            )),
        }
    }

    /// Whether entry is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self {
            EntrySchedule::Immediate => true,
            EntrySchedule::At(at) => now >= *at,
        }
    }

    /// The gated entry instant, if any.
    pub fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            EntrySchedule::Immediate => None,
            EntrySchedule::At(at) => Some(*at),
        }
    }
}

// =============================================================================
// Trade Request
// =============================================================================

/// Immutable description of one trade cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub side: Side,
    pub symbol: Symbol,
    pub risk: RiskSpec,
    pub entry: EntrySchedule,
    pub exit_at: DateTime<Utc>,
    /// Explicit take-profit; derived from the configured ratio when absent
    pub take_profit: Option<Price>,
    /// Explicit stop-loss; skips price-level derivation when present
    pub stop_loss: Option<Price>,
}

impl TradeRequest {
    /// Validate the request against the clock at Start time.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRequest` when:
    /// - the exit time is not after a time-gated entry
    /// - the exit time is not in the future
    /// - explicit stop-loss and take-profit are the same price
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if let Some(entry_at) = self.entry.at() {
            if self.exit_at <= entry_at {
                return Err(DomainError::InvalidRequest(format!(
                    "exit time {} must be after entry time {}",
                    self.exit_at, entry_at
                )));
            }
        }

        if self.exit_at <= now {
            return Err(DomainError::InvalidRequest(format!(
                "exit time {} is not in the future",
                self.exit_at
            )));
        }

        if let (Some(tp), Some(sl)) = (self.take_profit, self.stop_loss) {
            if tp == sl {
                return Err(DomainError::InvalidRequest(
                    "take profit and stop loss cannot be the same price".to_string(),
                ));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Wall Clock
// =============================================================================

/// The single zone in which wall-clock inputs are interpreted.
///
/// Inputs are converted to UTC immediately; nothing downstream ever sees a
/// naive local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClockZone {
    offset: FixedOffset,
}

impl WallClockZone {
    const NAIVE_FORMATS: &'static [&'static str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];

    /// UTC wall clock
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Zone from a fixed offset
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Parse an offset such as `+09:00`, `-0530` or `Z`.
    pub fn from_offset_str(s: &str) -> Result<Self, DomainError> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
            return Ok(Self::utc());
        }

        let invalid = || DomainError::InvalidTimestamp(format!("Invalid UTC offset: {}", s));

        let (sign, rest) = match s.chars().next() {
            Some('+') => (1, &s[1..]),
            Some('-') => (-1, &s[1..]),
            _ => return Err(invalid()),
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
        let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
        if minutes >= 60 {
            return Err(invalid());
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self::new)
            .ok_or_else(invalid)
    }

    /// The configured offset
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Parse a wall-clock input into an absolute instant.
    ///
    /// RFC 3339 inputs carry their own offset and are honored as-is; naive
    /// inputs (`YYYY-MM-DD HH:MM[:SS]`) are read in this zone.
    pub fn parse(&self, input: &str) -> Result<DateTime<Utc>, DomainError> {
        let input = input.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
            return Ok(dt.with_timezone(&Utc));
        }

        for format in Self::NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
                return self
                    .offset
                    .from_local_datetime(&naive)
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok_or_else(|| {
                        DomainError::InvalidTimestamp(format!("Ambiguous local time: {}", input))
                    });
            }
        }

        Err(DomainError::InvalidTimestamp(format!(
            "{}. Expected YYYY-MM-DD HH:MM[:SS] or RFC 3339",
            input
        )))
    }
}

impl Default for WallClockZone {
    fn default() -> Self {
        Self::utc()
    }
}

impl fmt::Display for WallClockZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.offset)
    }
}

// =============================================================================
// Tests
// =============================================================================
