//! Indicator Engine.
//!
//! Every indicator returns a `Vec<f64>` aligned to its input, with `NaN` for
//! positions before its lookback is satisfied. NaN inputs propagate forward;
//! they never turn into zeros. [`IndicatorFrame`] bundles the full set for one
//! candle series.

pub mod atr;
pub mod ema;
pub mod frame;
pub mod macd;
pub mod obv;
pub mod rsi;
pub mod sma;

pub use atr::Atr;
pub use ema::Ema;
pub use frame::{compute_frame, volatility_regime, FrameSeries, IndicatorFrame};
pub use macd::{macd, MacdSeries};
pub use obv::Obv;
pub use rsi::Rsi;
pub use sma::VolumeSma;

use crate::domain::Candle;

/// A single-series indicator over a candle slice.
///
/// `compute` must be a pure function of its input.
pub trait Indicator: Send + Sync {
    fn name(&self) -> &str;

    /// Index of the first candle at which the output can be defined.
    fn lookback(&self) -> usize;

    fn compute(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Synthetic candles from close prices for testing.
///
/// open = prev close (or close for the first candle), high/low = body ± 1.0,
/// volume = 1000, hourly open times.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    use chrono::TimeZone;
    let base = chrono::Utc
        .with_ymd_and_hms(2024, 1, 2, 0, 0, 0)
        .single()
        .unwrap_or_default();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(
                base + chrono::Duration::hours(i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1000.0,
            )
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
