//! 1–3 candle templates. Each is a pure predicate over OHLC ratios.

use super::{PatternKind, PatternMatch};
use crate::config::PatternConfig;
use crate::domain::{Candle, Direction};

const HAMMER_MAX_BODY: f64 = 0.35;
const HAMMER_MIN_SHADOW_TO_BODY: f64 = 2.0;
const HAMMER_MIN_SHADOW: f64 = 0.55;
const HAMMER_MAX_OPPOSITE_SHADOW: f64 = 0.15;
const LARGE_BODY: f64 = 0.5;
const HARAMI_MAX_INNER: f64 = 0.5;
const TWEEZER_TOLERANCE: f64 = 0.05;
const STAR_MAX_BODY: f64 = 0.3;
const MARUBOZU_MIN_BODY: f64 = 0.95;

fn body_ratio(c: &Candle) -> f64 {
    let range = c.range();
    if range > 0.0 {
        c.body() / range
    } else {
        0.0
    }
}

fn is_hammer_shape(c: &Candle) -> bool {
    let range = c.range();
    range > 0.0
        && c.body() <= HAMMER_MAX_BODY * range
        && c.lower_shadow() >= HAMMER_MIN_SHADOW_TO_BODY * c.body()
        && c.lower_shadow() >= HAMMER_MIN_SHADOW * range
        && c.upper_shadow() <= HAMMER_MAX_OPPOSITE_SHADOW * range
}

fn is_inverted_hammer_shape(c: &Candle) -> bool {
    let range = c.range();
    range > 0.0
        && c.body() <= HAMMER_MAX_BODY * range
        && c.upper_shadow() >= HAMMER_MIN_SHADOW_TO_BODY * c.body()
        && c.upper_shadow() >= HAMMER_MIN_SHADOW * range
        && c.lower_shadow() <= HAMMER_MAX_OPPOSITE_SHADOW * range
}

fn single(c: &Candle) -> Option<PatternKind> {
    if is_hammer_shape(c) {
        return Some(PatternKind::Hammer);
    }
    if body_ratio(c) >= MARUBOZU_MIN_BODY {
        if c.is_bullish() {
            return Some(PatternKind::BullishMarubozu);
        }
        if c.is_bearish() {
            return Some(PatternKind::BearishMarubozu);
        }
    }
    None
}

fn pair(prev: &Candle, curr: &Candle) -> Vec<PatternKind> {
    let mut kinds = Vec::new();

    // Same shape; the preceding candle decides which reading applies.
    if is_inverted_hammer_shape(curr) {
        if prev.is_bearish() {
            kinds.push(PatternKind::InvertedHammer);
        } else if prev.is_bullish() {
            kinds.push(PatternKind::ShootingStar);
        }
    }

    if prev.is_bearish()
        && curr.is_bullish()
        && curr.open <= prev.close
        && curr.close >= prev.open
        && curr.body() > prev.body()
    {
        kinds.push(PatternKind::BullishEngulfing);
    }
    if prev.is_bullish()
        && curr.is_bearish()
        && curr.open >= prev.close
        && curr.close <= prev.open
        && curr.body() > prev.body()
    {
        kinds.push(PatternKind::BearishEngulfing);
    }

    let inside = curr.body_top() <= prev.body_top()
        && curr.body_bottom() >= prev.body_bottom()
        && curr.body() < HARAMI_MAX_INNER * prev.body();
    if inside && body_ratio(prev) >= LARGE_BODY {
        if prev.is_bearish() && curr.is_bullish() {
            kinds.push(PatternKind::BullishHarami);
        } else if prev.is_bullish() && curr.is_bearish() {
            kinds.push(PatternKind::BearishHarami);
        }
    }

    let tolerance = TWEEZER_TOLERANCE * (prev.range() + curr.range()) / 2.0;
    if tolerance > 0.0 {
        if prev.is_bearish() && curr.is_bullish() && (prev.low - curr.low).abs() <= tolerance {
            kinds.push(PatternKind::TweezerBottom);
        }
        if prev.is_bullish() && curr.is_bearish() && (prev.high - curr.high).abs() <= tolerance {
            kinds.push(PatternKind::TweezerTop);
        }
    }

    kinds
}

fn triple(c1: &Candle, c2: &Candle, c3: &Candle) -> Option<PatternKind> {
    let mid1 = (c1.open + c1.close) / 2.0;
    let small_middle = c2.body() <= STAR_MAX_BODY * c1.body();
    if body_ratio(c1) >= LARGE_BODY && small_middle {
        if c1.is_bearish() && c2.body_top() <= mid1 && c3.is_bullish() && c3.close > mid1 {
            return Some(PatternKind::MorningStar);
        }
        if c1.is_bullish() && c2.body_bottom() >= mid1 && c3.is_bearish() && c3.close < mid1 {
            return Some(PatternKind::EveningStar);
        }
    }

    let strong = [c1, c2, c3].iter().all(|c| body_ratio(c) >= LARGE_BODY);
    if !strong {
        return None;
    }
    let opens_inside = |prev: &Candle, curr: &Candle| {
        curr.open >= prev.body_bottom() && curr.open <= prev.body_top()
    };
    if [c1, c2, c3].iter().all(|c| c.is_bullish())
        && c2.close > c1.close
        && c3.close > c2.close
        && opens_inside(c1, c2)
        && opens_inside(c2, c3)
    {
        return Some(PatternKind::ThreeWhiteSoldiers);
    }
    if [c1, c2, c3].iter().all(|c| c.is_bearish())
        && c2.close < c1.close
        && c3.close < c2.close
        && opens_inside(c1, c2)
        && opens_inside(c2, c3)
    {
        return Some(PatternKind::ThreeBlackCrows);
    }
    None
}

/// `run` candles ending just before `start`, all coloured `dir`.
fn preceded_by_run(candles: &[Candle], start: usize, run: usize, dir: Direction) -> bool {
    if run == 0 || start < run {
        return false;
    }
    candles[start - run..start].iter().all(|c| match dir {
        Direction::Bullish => c.is_bullish(),
        Direction::Bearish => c.is_bearish(),
    })
}

fn strength(kind: PatternKind, candles: &[Candle], start: usize, config: &PatternConfig) -> f64 {
    let prior = if kind.is_continuation() {
        kind.direction()
    } else {
        kind.direction().opposite()
    };
    let mut s = kind.base_strength();
    if preceded_by_run(candles, start, config.trend_context_run, prior) {
        s += config.trend_context_bonus;
    }
    s.min(config.max_strength)
}

/// Every template hit in `candles`. Assumes well-formed input.
pub fn detect(candles: &[Candle], config: &PatternConfig) -> Vec<PatternMatch> {
    let mut matches = Vec::new();
    let mut push = |kind: PatternKind, start: usize, index: usize| {
        let s = strength(kind, candles, start, config);
        matches.push(PatternMatch::new(kind, start, index, s));
    };

    for i in 0..candles.len() {
        if let Some(kind) = single(&candles[i]) {
            push(kind, i, i);
        }
        if i >= 1 {
            for kind in pair(&candles[i - 1], &candles[i]) {
                push(kind, i - 1, i);
            }
        }
        if i >= 2 {
            if let Some(kind) = triple(&candles[i - 2], &candles[i - 1], &candles[i]) {
                push(kind, i - 2, i);
            }
        }
    }
    matches
}
