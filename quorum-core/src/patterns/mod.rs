//! Pattern Recognizer.
//!
//! Two detectors share [`PatternMatch`]: [`simple`] evaluates 1–3 candle
//! templates at every position, [`complex`] finds extrema-based chart
//! patterns over a trailing window. Malformed input (NaN, high < low,
//! non-positive prices, non-increasing timestamps) yields no matches.

pub mod complex;
pub mod extrema;
pub mod simple;

use serde::{Deserialize, Serialize};

use crate::config::PatternConfig;
use crate::domain::{Candle, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Hammer,
    InvertedHammer,
    ShootingStar,
    BullishEngulfing,
    BearishEngulfing,
    BullishHarami,
    BearishHarami,
    TweezerBottom,
    TweezerTop,
    MorningStar,
    EveningStar,
    ThreeWhiteSoldiers,
    ThreeBlackCrows,
    BullishMarubozu,
    BearishMarubozu,
    HeadAndShoulders,
    InverseHeadAndShoulders,
    DoubleTop,
    DoubleBottom,
}

impl PatternKind {
    /// Direction is fixed per template.
    pub fn direction(&self) -> Direction {
        use PatternKind::*;
        match self {
            Hammer | InvertedHammer | BullishEngulfing | BullishHarami | TweezerBottom
            | MorningStar | ThreeWhiteSoldiers | BullishMarubozu | InverseHeadAndShoulders
            | DoubleBottom => Direction::Bullish,
            ShootingStar | BearishEngulfing | BearishHarami | TweezerTop | EveningStar
            | ThreeBlackCrows | BearishMarubozu | HeadAndShoulders | DoubleTop => {
                Direction::Bearish
            }
        }
    }

    pub fn base_strength(&self) -> f64 {
        use PatternKind::*;
        match self {
            HeadAndShoulders | InverseHeadAndShoulders => 0.8,
            MorningStar | EveningStar | ThreeWhiteSoldiers | ThreeBlackCrows => 0.8,
            BullishEngulfing | BearishEngulfing | DoubleTop | DoubleBottom => 0.7,
            Hammer | InvertedHammer | ShootingStar | TweezerBottom | TweezerTop => 0.5,
            BullishHarami | BearishHarami | BullishMarubozu | BearishMarubozu => 0.4,
        }
    }

    /// Continuation templates get trend credit for a run in their own
    /// direction; reversals for a run against it.
    pub fn is_continuation(&self) -> bool {
        matches!(
            self,
            PatternKind::ThreeWhiteSoldiers
                | PatternKind::ThreeBlackCrows
                | PatternKind::BullishMarubozu
                | PatternKind::BearishMarubozu
        )
    }

    pub fn is_complex(&self) -> bool {
        matches!(
            self,
            PatternKind::HeadAndShoulders
                | PatternKind::InverseHeadAndShoulders
                | PatternKind::DoubleTop
                | PatternKind::DoubleBottom
        )
    }
}

/// Inclusive candle index range a pattern spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternWindow {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Candle at which the pattern is complete.
    pub index: usize,
    pub kind: PatternKind,
    pub direction: Direction,
    pub strength: f64,
    pub window: PatternWindow,
    /// Complex patterns only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neckline: Option<f64>,
    /// Measured-move target projected from the neckline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
}

impl PatternMatch {
    pub(crate) fn new(kind: PatternKind, start: usize, index: usize, strength: f64) -> Self {
        Self {
            index,
            kind,
            direction: kind.direction(),
            strength,
            window: PatternWindow { start, end: index },
            neckline: None,
            target: None,
        }
    }
}

/// Candles the recognizer will accept.
pub fn is_well_formed(candles: &[Candle]) -> bool {
    candles.iter().all(Candle::is_sane)
        && candles.windows(2).all(|w| w[0].open_time < w[1].open_time)
}

/// All simple and complex matches, ordered by completion index.
pub fn recognize(candles: &[Candle], config: &PatternConfig) -> Vec<PatternMatch> {
    if candles.is_empty() || !is_well_formed(candles) {
        return Vec::new();
    }
    let mut matches = simple::detect(candles, config);
    matches.extend(complex::detect(candles, config));
    matches.sort_by_key(|m| (m.index, m.window.start));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    #[test]
    fn direction_is_intrinsic() {
        assert_eq!(PatternKind::Hammer.direction(), Direction::Bullish);
        assert_eq!(PatternKind::ShootingStar.direction(), Direction::Bearish);
        assert_eq!(PatternKind::DoubleBottom.direction(), Direction::Bullish);
    }

    #[test]
    fn empty_input_no_matches() {
        assert!(recognize(&[], &PatternConfig::default()).is_empty());
    }

    #[test]
    fn nan_candle_no_matches() {
        let mut candles = make_candles(&[100.0, 99.0, 98.0, 97.0, 101.0]);
        candles[2].high = f64::NAN;
        assert!(recognize(&candles, &PatternConfig::default()).is_empty());
    }

    #[test]
    fn non_monotonic_timestamps_no_matches() {
        let mut candles = make_candles(&[100.0, 99.0, 98.0, 97.0, 101.0]);
        candles.swap(1, 2);
        assert!(recognize(&candles, &PatternConfig::default()).is_empty());
    }

    #[test]
    fn high_below_low_no_matches() {
        let mut candles = make_candles(&[100.0, 99.0, 98.0]);
        candles[1].high = candles[1].low - 1.0;
        assert!(recognize(&candles, &PatternConfig::default()).is_empty());
    }
}
