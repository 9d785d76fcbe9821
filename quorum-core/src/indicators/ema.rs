//! Exponential Moving Average (EMA).
//!
//! EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (period + 1).
//! Seed: simple mean of the first `period` defined values.
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            name: format!("ema_{period}"),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        ema_of_series(&closes, self.period)
    }
}

/// EMA of an arbitrary series.
///
/// Leading NaNs are skipped, so derived series (MACD line, OBV) can be smoothed
/// directly: the seed window starts at the first defined value. A NaN inside
/// the seed window leaves the whole output undefined; a NaN after the seed
/// taints every later value.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 {
        return result;
    }

    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return result;
    };
    let seed_end = start + period;
    if seed_end > n {
        return result;
    }

    let window = &values[start..seed_end];
    if window.iter().any(|v| v.is_nan()) {
        return result;
    }
    let seed = window.iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        let ema = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = ema;
        prev = ema;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn ema_period_1_equals_close() {
        let candles = make_candles(&[100.0, 200.0, 300.0]);
        let result = Ema::new(1).compute(&candles);
        assert_approx(result[0], 100.0, DEFAULT_EPSILON);
        assert_approx(result[1], 200.0, DEFAULT_EPSILON);
        assert_approx(result[2], 300.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_3_known_values() {
        // alpha = 0.5, seed at index 2 = mean(10, 11, 12) = 11
        // EMA[3] = 0.5*13 + 0.5*11 = 12, EMA[4] = 0.5*14 + 0.5*12 = 13
        let candles = make_candles(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let result = Ema::new(3).compute(&candles);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert_approx(result[2], 11.0, DEFAULT_EPSILON);
        assert_approx(result[3], 12.0, DEFAULT_EPSILON);
        assert_approx(result[4], 13.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_matches_recursion_bit_for_bit() {
        let closes = [3.0, 7.5, 1.25, 9.0, 4.4, 6.6, 2.2, 8.8];
        let result = ema_of_series(&closes, 4);
        let alpha = 2.0 / 5.0;
        let mut expected = (3.0 + 7.5 + 1.25 + 9.0) / 4.0;
        assert_eq!(result[3], expected);
        for i in 4..closes.len() {
            expected = alpha * closes[i] + (1.0 - alpha) * expected;
            assert_eq!(result[i], expected);
        }
    }

    #[test]
    fn ema_converges_to_constant_input() {
        let mut closes = vec![50.0; 5];
        closes.extend(std::iter::repeat(80.0).take(200));
        let result = ema_of_series(&closes, 10);
        assert_approx(*result.last().unwrap(), 80.0, 1e-6);
    }

    #[test]
    fn ema_insufficient_history_all_nan() {
        let result = ema_of_series(&[1.0, 2.0], 3);
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn ema_nan_in_seed_produces_all_nan() {
        let mut candles = make_candles(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        candles[1].close = f64::NAN;
        let result = Ema::new(3).compute(&candles);
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn ema_nan_after_seed_propagates() {
        let mut candles = make_candles(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        candles[3].close = f64::NAN;
        let result = Ema::new(3).compute(&candles);
        assert_approx(result[2], 11.0, DEFAULT_EPSILON);
        assert!(result[3].is_nan());
        assert!(result[4].is_nan());
    }

    #[test]
    fn ema_skips_leading_nan() {
        let values = [f64::NAN, f64::NAN, 2.0, 4.0, 6.0];
        let result = ema_of_series(&values, 2);
        assert!(result[2].is_nan());
        assert_approx(result[3], 3.0, DEFAULT_EPSILON);
        // alpha = 2/3: 2/3*6 + 1/3*3 = 5
        assert_approx(result[4], 5.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_lookback() {
        assert_eq!(Ema::new(20).lookback(), 19);
        assert_eq!(Ema::new(1).lookback(), 0);
    }
}
