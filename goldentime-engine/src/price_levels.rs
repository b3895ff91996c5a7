//! Stop-loss derivation from recent support/resistance.
//!
//! Candidate levels are the recent completed-candle lows (long) or highs
//! (short) strictly beyond entry in the adverse direction. Candidates are
//! ranked by distance from entry. The 2nd-nearest one, pushed a few ticks
//! further away, becomes the stop unless that lands beyond a fixed-fraction
//! fallback stop, in which case the fallback wins.

use goldentime_domain::{Price, Side};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::error::{EngineError, EngineResult};

/// Decimal places of the fallback stop.
const FALLBACK_DECIMALS: u32 = 8;

/// Which branch produced the stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopLossBasis {
    /// 2nd-nearest level offset by ticks
    SecondLevel,
    /// 2nd-nearest level was farther than the fallback; clamped
    ClampedToFallback,
    /// Only one adverse level
    SingleLevel,
    /// Entry is the extreme of the window
    NoAdverseLevels,
}

/// Result of a stop-loss derivation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopLossDerivation {
    pub stop_loss: Price,
    pub basis: StopLossBasis,
    /// Distance from entry as a percentage of entry
    pub stop_distance_pct: Decimal,
    pub rationale: String,
}

/// Stateless stop-loss analyzer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceLevelAnalyzer;

impl PriceLevelAnalyzer {
    /// Derive a stop-loss for a position of `side` entered at `entry`.
    ///
    /// `levels` are lows for a long and highs for a short.
    ///
    /// # Errors
    /// - `EngineError::NoData` if `levels` is empty
    /// - `EngineError::InvalidFallbackFraction` unless 0 < fraction < 1
    /// - `EngineError::ZeroStopDistance` if rounding collapses the stop onto entry
    pub fn derive_stop_loss(
        &self,
        levels: &[Price],
        entry: Price,
        side: Side,
        tick_size: Price,
        tick_offset: u32,
        fallback_fraction: Decimal,
    ) -> EngineResult<StopLossDerivation> {
        if levels.is_empty() {
            return Err(EngineError::NoData(format!(
                "no recent price levels for {} entry at {}",
                side, entry
            )));
        }
        if fallback_fraction <= Decimal::ZERO || fallback_fraction >= Decimal::ONE {
            return Err(EngineError::InvalidFallbackFraction(fallback_fraction));
        }

        let entry_dec = entry.as_decimal();
        let candidates = rank_adverse_levels(levels, entry_dec, side);
        let fallback = fallback_stop(entry_dec, side, fallback_fraction);
        let offset = tick_size.as_decimal() * Decimal::from(tick_offset);

        let (stop, basis) = match candidates.get(1) {
            Some(&second) => {
                let tentative = match side {
                    Side::Long => second - offset,
                    Side::Short => second + offset,
                };
                let beyond_fallback = match side {
                    Side::Long => tentative < fallback,
                    Side::Short => tentative > fallback,
                };
                if beyond_fallback {
                    (fallback, StopLossBasis::ClampedToFallback)
                } else {
                    (tentative, StopLossBasis::SecondLevel)
                }
            }
            None if candidates.len() == 1 => (fallback, StopLossBasis::SingleLevel),
            None => (fallback, StopLossBasis::NoAdverseLevels),
        };

        let distance = match side {
            Side::Long => entry_dec - stop,
            Side::Short => stop - entry_dec,
        };
        if distance <= Decimal::ZERO {
            return Err(EngineError::ZeroStopDistance { entry: entry_dec, stop });
        }

        let stop_distance_pct = distance / entry_dec * Decimal::ONE_HUNDRED;
        let stop_loss = Price::new(stop)?;
        let rationale = describe(
            basis,
            side,
            candidates.get(1).copied(),
            tick_offset,
            stop_loss,
            stop_distance_pct,
        );

        Ok(StopLossDerivation {
            stop_loss,
            basis,
            stop_distance_pct,
            rationale,
        })
    }
}

/// Adverse levels, deduplicated, nearest to entry first.
fn rank_adverse_levels(levels: &[Price], entry: Decimal, side: Side) -> Vec<Decimal> {
    let unique: BTreeSet<Decimal> = levels
        .iter()
        .map(Price::as_decimal)
        .filter(|level| match side {
            Side::Long => *level < entry,
            Side::Short => *level > entry,
        })
        .map(|level| level.normalize())
        .collect();

    let mut ranked: Vec<Decimal> = unique.into_iter().collect();
    ranked.sort_by_key(|level| (entry - *level).abs());
    ranked
}

/// Fixed-fraction stop: entry × (1 ∓ fraction), 8 decimal places.
fn fallback_stop(entry: Decimal, side: Side, fraction: Decimal) -> Decimal {
    let factor = match side {
        Side::Long => Decimal::ONE - fraction,
        Side::Short => Decimal::ONE + fraction,
    };
    (entry * factor).round_dp(FALLBACK_DECIMALS)
}

/// Snap `price` onto the `tick` grid, moving toward `anchor`.
///
/// Protective prices are tightened toward entry. When the tightened value
/// would land on or past `anchor`, the price snaps away from it instead.
pub fn snap_to_tick(price: Decimal, tick: Decimal, anchor: Decimal) -> Decimal {
    if tick <= Decimal::ZERO || price == anchor {
        return price;
    }
    let steps = price / tick;
    let below = price < anchor;
    let (toward, away) = if below {
        (steps.ceil(), steps.floor())
    } else {
        (steps.floor(), steps.ceil())
    };

    let snapped = toward * tick;
    let crossed = if below { snapped >= anchor } else { snapped <= anchor };
    if crossed {
        (away * tick).normalize()
    } else {
        snapped.normalize()
    }
}

fn describe(
    basis: StopLossBasis,
    side: Side,
    second: Option<Decimal>,
    tick_offset: u32,
    stop: Price,
    pct: Decimal,
) -> String {
    let level_name = match side {
        Side::Long => "support",
        Side::Short => "resistance",
    };
    let head = match (basis, second) {
        (StopLossBasis::SecondLevel, Some(level)) => format!(
            "2nd {} ({}) offset by {} ticks = {}",
            level_name,
            level.normalize(),
            tick_offset,
            stop
        ),
        (StopLossBasis::ClampedToFallback, Some(level)) => format!(
            "2nd {} ({}) offset by {} ticks lies beyond the fallback stop; using fallback {}",
            level_name,
            level.normalize(),
            tick_offset,
            stop
        ),
        (StopLossBasis::SingleLevel, _) => {
            format!("only one {} level; using fallback {}", level_name, stop)
        }
        _ => format!("entry is the window extreme; using fallback {}", stop),
    };
    format!("{} ({}% from entry)", head, pct.round_dp(2))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn prices(values: &[Decimal]) -> Vec<Price> {
        values.iter().map(|v| Price::new(*v).unwrap()).collect()
    }

    fn p(value: Decimal) -> Price {
        Price::new(value).unwrap()
    }

    #[test]
    fn test_reference_scenario_clamps_to_fallback() {
        // Ranked by distance: 98, 97, 96, 95, 94. 97 - 5 ticks = 92, beyond 99.
        let levels = prices(&[dec!(95), dec!(97), dec!(96), dec!(94), dec!(98)]);
        let result = PriceLevelAnalyzer
            .derive_stop_loss(&levels, p(dec!(100)), Side::Long, p(dec!(1)), 5, dec!(0.01))
            .unwrap();

        assert_eq!(result.stop_loss.as_decimal(), dec!(99));
        assert_eq!(result.basis, StopLossBasis::ClampedToFallback);
        assert_eq!(result.stop_distance_pct, dec!(1));
        assert!(result.rationale.contains("fallback"));
    }

    #[test]
    fn test_second_level_used_when_within_fallback() {
        let levels = prices(&[dec!(99.9), dec!(99.8), dec!(99.5)]);
        let result = PriceLevelAnalyzer
            .derive_stop_loss(&levels, p(dec!(100)), Side::Long, p(dec!(0.01)), 5, dec!(0.01))
            .unwrap();

        assert_eq!(result.stop_loss.as_decimal(), dec!(99.75));
        assert_eq!(result.basis, StopLossBasis::SecondLevel);
    }

    #[test]
    fn test_short_mirrors_long() {
        let levels = prices(&[dec!(100.1), dec!(100.2), dec!(100.4)]);
        let result = PriceLevelAnalyzer
            .derive_stop_loss(&levels, p(dec!(100)), Side::Short, p(dec!(0.01)), 5, dec!(0.01))
            .unwrap();

        assert_eq!(result.stop_loss.as_decimal(), dec!(100.25));
        assert_eq!(result.basis, StopLossBasis::SecondLevel);
    }

    #[test]
    fn test_duplicates_collapse_before_ranking() {
        // 99.9 appears twice; the 2nd distinct level is 99.8
        let levels = prices(&[dec!(99.9), dec!(99.90), dec!(99.8)]);
        let result = PriceLevelAnalyzer
            .derive_stop_loss(&levels, p(dec!(100)), Side::Long, p(dec!(0.01)), 5, dec!(0.01))
            .unwrap();

        assert_eq!(result.stop_loss.as_decimal(), dec!(99.75));
    }

    #[test]
    fn test_single_candidate_uses_fallback() {
        let levels = prices(&[dec!(98), dec!(101), dec!(103)]);
        let result = PriceLevelAnalyzer
            .derive_stop_loss(&levels, p(dec!(100)), Side::Long, p(dec!(1)), 5, dec!(0.01))
            .unwrap();

        assert_eq!(result.stop_loss.as_decimal(), dec!(99));
        assert_eq!(result.basis, StopLossBasis::SingleLevel);
    }

    #[test]
    fn test_no_adverse_candidates_uses_fallback() {
        let levels = prices(&[dec!(96), dec!(95)]);
        let result = PriceLevelAnalyzer
            .derive_stop_loss(&levels, p(dec!(97)), Side::Short, p(dec!(1)), 5, dec!(0.01))
            .unwrap();

        assert_eq!(result.stop_loss.as_decimal(), dec!(97.97));
        assert_eq!(result.basis, StopLossBasis::NoAdverseLevels);
    }

    #[test]
    fn test_fallback_rounds_to_eight_places() {
        let levels = prices(&[dec!(2)]);
        let result = PriceLevelAnalyzer
            .derive_stop_loss(
                &levels,
                p(dec!(1.123456789)),
                Side::Short,
                p(dec!(0.0001)),
                5,
                dec!(0.01),
            )
            .unwrap();

        assert_eq!(result.stop_loss.as_decimal(), (dec!(1.123456789) * dec!(1.01)).round_dp(8));
    }

    #[test]
    fn test_empty_levels_is_no_data() {
        let result = PriceLevelAnalyzer.derive_stop_loss(
            &[],
            p(dec!(100)),
            Side::Long,
            p(dec!(1)),
            5,
            dec!(0.01),
        );
        assert!(matches!(result, Err(EngineError::NoData(_))));
    }

    #[test]
    fn test_fallback_fraction_bounds() {
        let levels = prices(&[dec!(99)]);
        for fraction in [dec!(0), dec!(1), dec!(-0.01)] {
            let result = PriceLevelAnalyzer.derive_stop_loss(
                &levels,
                p(dec!(100)),
                Side::Long,
                p(dec!(1)),
                5,
                fraction,
            );
            assert!(matches!(result, Err(EngineError::InvalidFallbackFraction(_))));
        }
    }

    #[test]
    fn test_snap_to_tick_tightens_toward_entry() {
        // Long stop below entry rounds up, long take-profit above rounds down
        assert_eq!(snap_to_tick(dec!(94058.7321), dec!(0.1), dec!(95008.82)), dec!(94058.8));
        assert_eq!(snap_to_tick(dec!(96909.0018), dec!(0.1), dec!(95008.82)), dec!(96909));
        // Short side mirrors
        assert_eq!(snap_to_tick(dec!(95958.9082), dec!(0.5), dec!(95008.82)), dec!(95958.5));
        assert_eq!(snap_to_tick(dec!(93108.6436), dec!(0.5), dec!(95008.82)), dec!(93109));
    }

    #[test]
    fn test_snap_to_tick_keeps_on_grid_and_never_reaches_anchor() {
        assert_eq!(snap_to_tick(dec!(99), dec!(1), dec!(100)), dec!(99));
        // Tightening would land on entry, so the stop moves one tick away
        assert_eq!(snap_to_tick(dec!(99.6), dec!(1), dec!(100)), dec!(99));
        assert_eq!(snap_to_tick(dec!(100.4), dec!(1), dec!(100)), dec!(101));
        assert_eq!(snap_to_tick(dec!(99.6), dec!(0), dec!(100)), dec!(99.6));
    }

    fn arb_levels() -> impl Strategy<Value = Vec<Decimal>> {
        prop::collection::vec(1u32..200_000u32, 1..12)
            .prop_map(|raw| raw.into_iter().map(|v| Decimal::new(v as i64, 2)).collect())
    }

    proptest! {
        /// Long stops stay below entry and short stops stay above, whatever the levels.
        #[test]
        fn stop_is_always_on_the_protective_side(
            levels in arb_levels(),
            entry_cents in 100u32..200_000u32,
            tick_offset in 0u32..20,
            long in any::<bool>(),
        ) {
            let entry = Price::new(Decimal::new(entry_cents as i64, 2)).unwrap();
            let side = if long { Side::Long } else { Side::Short };
            let result = PriceLevelAnalyzer
                .derive_stop_loss(
                    &prices(&levels),
                    entry,
                    side,
                    Price::new(dec!(0.01)).unwrap(),
                    tick_offset,
                    dec!(0.01),
                )
                .unwrap();

            match side {
                Side::Long => prop_assert!(result.stop_loss < entry),
                Side::Short => prop_assert!(result.stop_loss > entry),
            }
            prop_assert!(result.stop_distance_pct > Decimal::ZERO);
            prop_assert!(result.stop_distance_pct <= dec!(1));
        }
    }
}
