//! Confirmation filters over one timeframe's immutable snapshot.
//!
//! Each filter is a pure function of the same inputs and reports a
//! [`FactorOutcome`]; none depends on another's result. Undefined inputs give
//! `Unavailable`, a config toggle set to off gives `Disabled`.

use crate::config::EngineConfig;
use crate::domain::{Candle, Direction, Factor, FactorOutcome};
use crate::indicators::{FrameSeries, IndicatorFrame};
use crate::patterns::{is_well_formed, PatternMatch};

pub const EMA_CROSS: &str = "ema_cross";
pub const EMA_TREND: &str = "ema_trend";
pub const RSI: &str = "rsi";
pub const MACD: &str = "macd";
pub const VOLUME: &str = "volume";
pub const PATTERN: &str = "pattern";
pub const MTF_ALIGNMENT: &str = "mtf_alignment";

/// Everything a filter may read for the latest candle of one timeframe.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub candles: &'a [Candle],
    pub frame: &'a IndicatorFrame,
    pub patterns: &'a [PatternMatch],
    pub config: &'a EngineConfig,
}

impl<'a> FilterContext<'a> {
    pub fn new(
        candles: &'a [Candle],
        frame: &'a IndicatorFrame,
        patterns: &'a [PatternMatch],
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            candles,
            frame,
            patterns,
            config,
        }
    }

    fn last(&self) -> Option<usize> {
        self.candles.len().checked_sub(1)
    }

    /// (previous, current) values of a series at the last two candles.
    fn pair(&self, series: FrameSeries) -> Option<(f64, f64)> {
        let i = self.last()?;
        let prev = self.frame.value(series, i.checked_sub(1)?)?;
        let curr = self.frame.value(series, i)?;
        Some((prev, curr))
    }
}

/// `a` crosses `b` in `dir` between the previous and the current candle.
fn crosses(a: (f64, f64), b: (f64, f64), dir: Direction) -> bool {
    match dir {
        Direction::Bullish => a.1 > b.1 && a.0 <= b.0,
        Direction::Bearish => a.1 < b.1 && a.0 >= b.0,
    }
}

/// Entry trigger: fast EMA crosses the slow EMA on the latest candle.
pub fn ema_cross(ctx: &FilterContext<'_>, dir: Direction) -> Factor {
    let outcome = match (ctx.pair(FrameSeries::EmaFast), ctx.pair(FrameSeries::EmaSlow)) {
        (Some(fast), Some(slow)) => FactorOutcome::from_bool(crosses(fast, slow, dir)),
        _ => FactorOutcome::Unavailable,
    };
    Factor::new(EMA_CROSS, outcome)
}

/// Fast EMA on the `dir` side of the slow EMA.
pub fn ema_trend(ctx: &FilterContext<'_>, dir: Direction) -> Factor {
    let outcome = ctx
        .last()
        .and_then(|i| {
            let fast = ctx.frame.value(FrameSeries::EmaFast, i)?;
            let slow = ctx.frame.value(FrameSeries::EmaSlow, i)?;
            Some(FactorOutcome::from_bool((fast - slow) * dir.sign() > 0.0))
        })
        .unwrap_or(FactorOutcome::Unavailable);
    Factor::new(EMA_TREND, outcome)
}

/// Long entries need RSI below overbought; shorts need it above oversold.
pub fn rsi(ctx: &FilterContext<'_>, dir: Direction) -> Factor {
    let Some(value) = ctx.last().and_then(|i| ctx.frame.value(FrameSeries::Rsi, i)) else {
        return Factor::new(RSI, FactorOutcome::Unavailable);
    };
    let passed = match dir {
        Direction::Bullish => value < ctx.config.decision.rsi_overbought,
        Direction::Bearish => value > ctx.config.decision.rsi_oversold,
    };
    Factor::new(RSI, FactorOutcome::from_bool(passed)).with_value(value)
}

/// Histogram on the `dir` side of zero, or the MACD line crossing its signal.
pub fn macd(ctx: &FilterContext<'_>, dir: Direction) -> Factor {
    let Some(hist) = ctx.last().and_then(|i| ctx.frame.value(FrameSeries::MacdHist, i)) else {
        return Factor::new(MACD, FactorOutcome::Unavailable);
    };
    let crossed = match (ctx.pair(FrameSeries::MacdLine), ctx.pair(FrameSeries::MacdSignal)) {
        (Some(line), Some(signal)) => crosses(line, signal, dir),
        _ => false,
    };
    let passed = hist * dir.sign() > 0.0 || crossed;
    Factor::new(MACD, FactorOutcome::from_bool(passed)).with_value(hist)
}

/// Volume above `volume_threshold` × its moving average with OBV trending in `dir`.
pub fn volume(ctx: &FilterContext<'_>, dir: Direction) -> Factor {
    let decision = &ctx.config.decision;
    if !decision.volume_confirmation {
        return Factor::new(VOLUME, FactorOutcome::Disabled);
    }
    let Some(i) = ctx.last() else {
        return Factor::new(VOLUME, FactorOutcome::Unavailable);
    };
    let volume = ctx.candles[i].volume;
    let (Some(ma), Some((obv_prev, obv_curr))) = (
        ctx.frame.value(FrameSeries::VolumeMa, i),
        ctx.pair(FrameSeries::ObvTrend),
    ) else {
        return Factor::new(VOLUME, FactorOutcome::Unavailable);
    };
    if !volume.is_finite() || ma <= 0.0 {
        return Factor::new(VOLUME, FactorOutcome::Unavailable);
    }
    let surge = volume > decision.volume_threshold * ma;
    let obv_agrees = (obv_curr - obv_prev) * dir.sign() > 0.0;
    Factor::new(VOLUME, FactorOutcome::from_bool(surge && obv_agrees)).with_value(volume / ma)
}

/// A `dir` pattern of sufficient strength completed within the recency window.
pub fn pattern(ctx: &FilterContext<'_>, dir: Direction) -> Factor {
    let decision = &ctx.config.decision;
    if !decision.pattern_confirmation {
        return Factor::new(PATTERN, FactorOutcome::Disabled);
    }
    let Some(last) = ctx.last() else {
        return Factor::new(PATTERN, FactorOutcome::Unavailable);
    };
    // The recognizer rejects malformed input wholesale, so "no match" would be meaningless.
    if !is_well_formed(ctx.candles) {
        return Factor::new(PATTERN, FactorOutcome::Unavailable);
    }
    let best = recent_patterns(ctx.patterns, last, decision.pattern_recency)
        .filter(|m| m.direction == dir)
        .map(|m| m.strength)
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));
    let passed = best.is_some_and(|s| s >= decision.min_pattern_strength);
    let factor = Factor::new(PATTERN, FactorOutcome::from_bool(passed));
    match best {
        Some(s) => factor.with_value(s),
        None => factor,
    }
}

/// Matches completed within the last `recency` candles ending at `last`.
pub fn recent_patterns(
    patterns: &[PatternMatch],
    last: usize,
    recency: usize,
) -> impl Iterator<Item = &PatternMatch> {
    let from = (last + 1).saturating_sub(recency.max(1));
    patterns
        .iter()
        .filter(move |m| m.index >= from && m.index <= last)
}
