//! IndicatorFrame: every indicator for one candle series, aligned per candle.

use serde::{Deserialize, Serialize};

use super::atr::Atr;
use super::ema::Ema;
use super::macd::macd;
use super::obv::{obv_trend, Obv};
use super::rsi::Rsi;
use super::sma::{sma_of_series, VolumeSma};
use super::Indicator;
use crate::config::IndicatorParams;
use crate::domain::Candle;

/// Named column of an [`IndicatorFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSeries {
    EmaFast,
    EmaSlow,
    Rsi,
    MacdLine,
    MacdSignal,
    MacdHist,
    Atr,
    VolumeMa,
    Obv,
    ObvTrend,
}

/// Per-candle derived values, same length and order as the input series.
///
/// Recomputed from scratch every cycle. NaN marks positions before an
/// indicator's lookback (or after undefined input); read through
/// [`IndicatorFrame::value`] to get `None` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorFrame {
    pub ema_fast: Vec<f64>,
    pub ema_slow: Vec<f64>,
    pub rsi: Vec<f64>,
    pub macd_line: Vec<f64>,
    pub macd_signal: Vec<f64>,
    pub macd_hist: Vec<f64>,
    pub atr: Vec<f64>,
    pub volume_ma: Vec<f64>,
    pub obv: Vec<f64>,
    pub obv_trend: Vec<f64>,
}

impl IndicatorFrame {
    pub fn len(&self) -> usize {
        self.ema_fast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ema_fast.is_empty()
    }

    pub fn series(&self, series: FrameSeries) -> &[f64] {
        match series {
            FrameSeries::EmaFast => &self.ema_fast,
            FrameSeries::EmaSlow => &self.ema_slow,
            FrameSeries::Rsi => &self.rsi,
            FrameSeries::MacdLine => &self.macd_line,
            FrameSeries::MacdSignal => &self.macd_signal,
            FrameSeries::MacdHist => &self.macd_hist,
            FrameSeries::Atr => &self.atr,
            FrameSeries::VolumeMa => &self.volume_ma,
            FrameSeries::Obv => &self.obv,
            FrameSeries::ObvTrend => &self.obv_trend,
        }
    }

    /// Defined value at `index`, or `None` (out of range, warmup, or NaN).
    pub fn value(&self, series: FrameSeries, index: usize) -> Option<f64> {
        self.series(series)
            .get(index)
            .copied()
            .filter(|v| v.is_finite())
    }

    /// Value at the most recent candle.
    pub fn latest(&self, series: FrameSeries) -> Option<f64> {
        self.len().checked_sub(1).and_then(|i| self.value(series, i))
    }

    /// Candles needed before every column is defined.
    pub fn max_lookback(params: &IndicatorParams) -> usize {
        params.max_lookback()
    }
}

/// Run every indicator over `candles`. Never fails: short or malformed input
/// produces leading (or trailing) NaNs.
pub fn compute_frame(candles: &[Candle], params: &IndicatorParams) -> IndicatorFrame {
    let m = macd(candles, params.macd_fast, params.macd_slow, params.macd_signal);
    let obv = Obv::new().compute(candles);
    let obv_trend = obv_trend(&obv, params.obv_smoothing);

    IndicatorFrame {
        ema_fast: Ema::new(params.ema_fast).compute(candles),
        ema_slow: Ema::new(params.ema_slow).compute(candles),
        rsi: Rsi::new(params.rsi_period).compute(candles),
        macd_line: m.line,
        macd_signal: m.signal,
        macd_hist: m.hist,
        atr: Atr::new(params.atr_period).compute(candles),
        volume_ma: VolumeSma::new(params.volume_ma_period).compute(candles),
        obv,
        obv_trend,
    }
}

/// Latest ATR relative to its own `lookback`-period mean.
///
/// Above 1.0 means volatility is expanding. `None` while either side is
/// undefined or the mean is zero.
pub fn volatility_regime(frame: &IndicatorFrame, lookback: usize) -> Option<f64> {
    let atr_ma = sma_of_series(&frame.atr, lookback);
    let atr = frame.latest(FrameSeries::Atr)?;
    let mean = atr_ma.last().copied().filter(|v| v.is_finite())?;
    if mean <= 0.0 {
        return None;
    }
    Some(atr / mean)
}
