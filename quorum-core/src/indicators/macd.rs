//! MACD built only from [`ema_of_series`], so every value is reproducible from
//! raw closes.
//!
//! line = EMA_fast - EMA_slow, signal = EMA(line, signal_period),
//! hist = line - signal. First signal value at index slow + signal - 2.

use super::ema::ema_of_series;
use crate::domain::Candle;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub hist: Vec<f64>,
}

pub fn macd(candles: &[Candle], fast: usize, slow: usize, signal_period: usize) -> MacdSeries {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let fast_ema = ema_of_series(&closes, fast);
    let slow_ema = ema_of_series(&closes, slow);

    // NaN on either side keeps the line undefined.
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal = ema_of_series(&line, signal_period);
    let hist = line.iter().zip(&signal).map(|(l, s)| l - s).collect();

    MacdSeries { line, signal, hist }
}
