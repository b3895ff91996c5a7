//! Fixed-risk position sizing and lot-size adjustment.
//!
//! # Golden Rule
//!
//! ```text
//! Quantity = Risk Budget / |Entry - Stop|
//! ```
//!
//! A stop-out then loses exactly the budget (before lot rounding).

use goldentime_domain::{Price, Quantity};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};

/// Venue quantity grid for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LotSizeFilter {
    pub min_qty: Decimal,
    pub qty_step: Decimal,
}

impl LotSizeFilter {
    pub fn new(min_qty: Decimal, qty_step: Decimal) -> EngineResult<Self> {
        if qty_step <= Decimal::ZERO {
            return Err(EngineError::InvalidLotSize(format!(
                "quantity step must be positive, got {}",
                qty_step
            )));
        }
        if min_qty < Decimal::ZERO {
            return Err(EngineError::InvalidLotSize(format!(
                "minimum quantity cannot be negative, got {}",
                min_qty
            )));
        }
        Ok(Self { min_qty, qty_step })
    }
}

/// Raw quantity that loses `risk_budget` if the stop is hit.
///
/// # Errors
/// `EngineError::ZeroStopDistance` when entry equals stop.
pub fn compute_quantity_from_risk(
    risk_budget: Decimal,
    entry: Price,
    stop_loss: Price,
) -> EngineResult<Decimal> {
    let distance = (entry.as_decimal() - stop_loss.as_decimal()).abs();
    if distance.is_zero() {
        return Err(EngineError::ZeroStopDistance {
            entry: entry.as_decimal(),
            stop: stop_loss.as_decimal(),
        });
    }

    risk_budget
        .checked_div(distance)
        .ok_or_else(|| EngineError::InvalidLotSize(format!("{} / {} overflowed", risk_budget, distance)))
}

/// Raise to the venue minimum, then floor onto the step grid.
///
/// Monotonic in `raw`. No rounding is applied beyond the step.
///
/// # Errors
/// `EngineError::InvalidLotSize` when the result is zero (minimum below one step).
pub fn adjust_quantity(raw: Decimal, filter: &LotSizeFilter) -> EngineResult<Quantity> {
    if filter.qty_step <= Decimal::ZERO {
        return Err(EngineError::InvalidLotSize(format!(
            "quantity step must be positive, got {}",
            filter.qty_step
        )));
    }

    let raised = raw.max(filter.min_qty);
    let steps = (raised / filter.qty_step).floor();
    let adjusted = (steps * filter.qty_step).normalize();

    Quantity::new(adjusted).map_err(|_| {
        EngineError::InvalidLotSize(format!(
            "{} adjusts to zero with min {} and step {}",
            raw, filter.min_qty, filter.qty_step
        ))
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn btc_filter() -> LotSizeFilter {
        LotSizeFilter::new(dec!(0.001), dec!(0.001)).unwrap()
    }

    fn p(value: Decimal) -> Price {
        Price::new(value).unwrap()
    }

    #[test]
    fn test_quantity_from_risk() {
        let qty = compute_quantity_from_risk(dec!(2.0), p(dec!(100)), p(dec!(99))).unwrap();
        assert_eq!(qty, dec!(2));

        // Short: stop above entry, same magnitude
        let qty = compute_quantity_from_risk(dec!(10), p(dec!(100)), p(dec!(102))).unwrap();
        assert_eq!(qty, dec!(5));
    }

    #[test]
    fn test_zero_stop_distance_is_detected() {
        let result = compute_quantity_from_risk(dec!(2.0), p(dec!(100)), p(dec!(100)));
        assert!(matches!(result, Err(EngineError::ZeroStopDistance { .. })));
    }

    #[test]
    fn test_adjust_raises_to_minimum() {
        let qty = adjust_quantity(dec!(0.0005), &btc_filter()).unwrap();
        assert_eq!(qty.as_decimal(), dec!(0.001));
    }

    #[test]
    fn test_adjust_floors_to_step() {
        let qty = adjust_quantity(dec!(0.0034), &btc_filter()).unwrap();
        assert_eq!(qty.as_decimal(), dec!(0.003));

        let filter = LotSizeFilter::new(dec!(1), dec!(0.5)).unwrap();
        assert_eq!(adjust_quantity(dec!(7.99), &filter).unwrap().as_decimal(), dec!(7.5));
    }

    #[test]
    fn test_adjust_keeps_exact_multiples() {
        let qty = adjust_quantity(dec!(2.0), &btc_filter()).unwrap();
        assert_eq!(qty.as_decimal(), dec!(2));
    }

    #[test]
    fn test_adjust_to_zero_is_an_error() {
        let filter = LotSizeFilter { min_qty: dec!(0), qty_step: dec!(1) };
        assert!(adjust_quantity(dec!(0.4), &filter).is_err());
    }

    #[test]
    fn test_filter_rejects_nonpositive_step() {
        assert!(LotSizeFilter::new(dec!(0.001), dec!(0)).is_err());
        assert!(LotSizeFilter::new(dec!(-1), dec!(0.001)).is_err());
    }

    proptest! {
        /// Larger raw quantity never yields a smaller adjusted quantity.
        #[test]
        fn adjust_is_monotonic(a in 0u64..5_000_000u64, b in 0u64..5_000_000u64) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let filter = btc_filter();
            let lo = adjust_quantity(Decimal::new(lo as i64, 6), &filter).unwrap();
            let hi = adjust_quantity(Decimal::new(hi as i64, 6), &filter).unwrap();
            prop_assert!(lo <= hi);
        }

        /// Adjusted quantity sits on the step grid and never drops below the minimum.
        #[test]
        fn adjust_lands_on_grid(raw in 0u64..5_000_000u64) {
            let filter = btc_filter();
            let qty = adjust_quantity(Decimal::new(raw as i64, 6), &filter).unwrap().as_decimal();
            prop_assert!(qty >= filter.min_qty);
            prop_assert!((qty % filter.qty_step).is_zero());
        }
    }
}
