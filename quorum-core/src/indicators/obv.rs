//! On-Balance Volume.
//!
//! OBV[0] = 0; adds volume on an up close, subtracts on a down close,
//! unchanged on a tie. The trend line is an EMA of OBV.

use super::ema::ema_of_series;
use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Obv {
    name: String,
}

impl Obv {
    pub fn new() -> Self {
        Self {
            name: "obv".to_string(),
        }
    }
}

impl Default for Obv {
    fn default() -> Self {
        Self::new()
    }
}

impl Indicator for Obv {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let n = candles.len();
        let mut result = vec![f64::NAN; n];
        if n == 0 {
            return result;
        }
        let mut acc = 0.0;
        result[0] = acc;
        for i in 1..n {
            let (curr, prev) = (&candles[i], &candles[i - 1]);
            if curr.close.is_nan() || prev.close.is_nan() || curr.volume.is_nan() {
                return result;
            }
            if curr.close > prev.close {
                acc += curr.volume;
            } else if curr.close < prev.close {
                acc -= curr.volume;
            }
            result[i] = acc;
        }
        result
    }
}

/// Smoothed OBV trend line. A period of 1 returns OBV unchanged.
pub fn obv_trend(obv: &[f64], smoothing: usize) -> Vec<f64> {
    if smoothing <= 1 {
        return obv.to_vec();
    }
    ema_of_series(obv, smoothing)
}
