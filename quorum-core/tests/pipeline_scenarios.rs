//! Full-pipeline scenarios: raw candles in, decision out.
//!
//! Indicators, patterns and aggregation all run for real; the confirmations
//! that need hand-tuned volume or chart patterns are switched off.

use chrono::{Duration, TimeZone, Utc};
use quorum_core::config::EngineConfig;
use quorum_core::domain::{
    Candle, CandleSeries, FactorOutcome, PositionState, SignalDecision, SignalType, Timeframe,
};
use quorum_core::indicators::{compute_frame, FrameSeries};
use quorum_core::pipeline::{evaluate, MarketSnapshot};

// ── Helpers ──────────────────────────────────────────────────────────

/// Choppy decline from 100 then a choppy recovery, so RSI stays mid-range
/// while the fast EMA climbs back through the slow one.
fn v_bottom_closes() -> Vec<f64> {
    let mut closes = vec![100.0];
    for i in 0..40 {
        let step = if i % 2 == 0 { -1.5 } else { 0.5 };
        closes.push(closes[closes.len() - 1] + step);
    }
    for i in 0..40 {
        let step = if i % 2 == 0 { 2.0 } else { -1.0 };
        closes.push(closes[closes.len() - 1] + step);
    }
    closes
}

fn candles(closes: &[f64]) -> Vec<Candle> {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(
                base + Duration::hours(i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1000.0,
            )
        })
        .collect()
}

/// Trigger plus RSI and MACD only.
fn indicator_only_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.decision.volume_confirmation = false;
    config.decision.pattern_confirmation = false;
    config.decision.mtf_confirmation = false;
    config
}

/// Index of the first candle where the fast EMA closes above the slow one
/// after being at or below it.
fn first_bullish_cross(candles: &[Candle], config: &EngineConfig) -> usize {
    let frame = compute_frame(candles, &config.indicators);
    let above = |i| {
        match (
            frame.value(FrameSeries::EmaFast, i),
            frame.value(FrameSeries::EmaSlow, i),
        ) {
            (Some(fast), Some(slow)) => Some(fast > slow),
            _ => None,
        }
    };
    (1..candles.len())
        .find(|&i| above(i) == Some(true) && above(i - 1) == Some(false))
        .expect("series has a bullish cross")
}

fn snapshot_through(candles: &[Candle], last: usize) -> MarketSnapshot {
    let series = CandleSeries::new("BTCUSDT", Timeframe::H1, candles[..=last].to_vec());
    let as_of = candles[last].open_time + Duration::hours(1);
    MarketSnapshot::new("BTCUSDT", as_of).with_series(series)
}

fn outcome(decision: &SignalDecision, name: &str) -> Option<FactorOutcome> {
    decision
        .contributing_factors
        .iter()
        .find(|f| f.name == name)
        .map(|f| f.outcome)
}

// ── Entries ──────────────────────────────────────────────────────────

#[test]
fn v_bottom_cross_goes_long() {
    let config = indicator_only_config();
    let candles = candles(&v_bottom_closes());
    let cross = first_bullish_cross(&candles, &config);
    assert!(cross >= config.indicators.max_lookback(), "cross at {cross}");

    let eval = evaluate(&snapshot_through(&candles, cross), &PositionState::flat(), &config);
    let d = &eval.decision;
    assert_eq!(d.signal, SignalType::Long, "{:?}", d.contributing_factors);
    assert_eq!(outcome(d, "ema_cross"), Some(FactorOutcome::Passed));
    assert_eq!(outcome(d, "rsi"), Some(FactorOutcome::Passed));
    assert_eq!(outcome(d, "macd"), Some(FactorOutcome::Passed));
    assert_eq!(outcome(d, "volume"), Some(FactorOutcome::Disabled));
    assert_eq!(outcome(d, "mtf_alignment"), Some(FactorOutcome::Disabled));
    // Filters alone contribute half; the lone primary's score adds the rest.
    assert!((0.35..=1.0).contains(&d.confidence), "{}", d.confidence);

    // Confirmations that were not fetched are reported, not fatal.
    assert_eq!(eval.unavailable.len(), 2);
    assert_eq!(eval.last_candle().unwrap().close, candles[cross].close);
    assert!(eval.primary_atr().unwrap() > 0.0);
}

#[test]
fn candle_before_the_cross_stays_flat() {
    let config = indicator_only_config();
    let candles = candles(&v_bottom_closes());
    let cross = first_bullish_cross(&candles, &config);

    let eval = evaluate(&snapshot_through(&candles, cross - 1), &PositionState::flat(), &config);
    assert_eq!(eval.decision.signal, SignalType::None);
    assert_eq!(outcome(&eval.decision, "ema_cross"), Some(FactorOutcome::Failed));
}

#[test]
fn overbought_rsi_vetoes_the_cross() {
    let mut config = indicator_only_config();
    config.decision.rsi_overbought = 50.0;
    config.decision.rsi_oversold = 20.0;
    let candles = candles(&v_bottom_closes());
    let cross = first_bullish_cross(&candles, &config);

    let eval = evaluate(&snapshot_through(&candles, cross), &PositionState::flat(), &config);
    assert_eq!(eval.decision.signal, SignalType::None);
    assert_eq!(outcome(&eval.decision, "ema_cross"), Some(FactorOutcome::Passed));
    assert_eq!(outcome(&eval.decision, "rsi"), Some(FactorOutcome::Failed));
}
