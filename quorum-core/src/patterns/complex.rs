//! Extrema-based chart patterns: head-and-shoulders (and inverse),
//! double top / double bottom.
//!
//! Runs over the trailing `complex_lookback` candles once at least
//! `min_window` exist. Candidates that miss a symmetry threshold are dropped.

use super::extrema::{find_extrema, Extremum, ExtremumKind};
use super::{PatternKind, PatternMatch};
use crate::config::PatternConfig;
use crate::domain::Candle;

/// Extra strength for perfect symmetry, scaled down linearly to zero at the threshold.
const SYMMETRY_BONUS: f64 = 0.25;

fn relative_diff(a: f64, b: f64) -> f64 {
    let mean = (a + b) / 2.0;
    if mean > 0.0 {
        (a - b).abs() / mean
    } else {
        f64::INFINITY
    }
}

fn kinds_are(window: &[Extremum], first: ExtremumKind) -> bool {
    window.iter().enumerate().all(|(i, e)| {
        let expected_first = i % 2 == 0;
        (e.kind == first) == expected_first
    })
}

fn build(
    kind: PatternKind,
    window: &[Extremum],
    (diff, threshold): (f64, f64),
    neckline: f64,
    target: f64,
    confirm_index: usize,
    config: &PatternConfig,
) -> PatternMatch {
    let symmetry = 1.0 - (diff / threshold).clamp(0.0, 1.0);
    let strength = (kind.base_strength() * (1.0 + SYMMETRY_BONUS * symmetry)).min(config.max_strength);
    let start = window.first().map_or(confirm_index, |e| e.index);
    let mut m = PatternMatch::new(kind, start, confirm_index, strength);
    m.neckline = Some(neckline);
    m.target = Some(target);
    m
}

fn head_and_shoulders(
    w: &[Extremum],
    confirm: usize,
    config: &PatternConfig,
) -> Option<PatternMatch> {
    let threshold = config.shoulder_diff_threshold;
    let (ls, head, rs) = (w[0].price, w[2].price, w[4].price);
    let diff = relative_diff(ls, rs);
    if diff > threshold {
        return None;
    }
    let neckline = (w[1].price + w[3].price) / 2.0;

    if kinds_are(w, ExtremumKind::Peak) {
        let height = head - neckline;
        if head > ls && head > rs && height > 0.0 {
            return Some(build(
                PatternKind::HeadAndShoulders,
                w,
                (diff, threshold),
                neckline,
                neckline - height,
                confirm,
                config,
            ));
        }
    } else if kinds_are(w, ExtremumKind::Trough) {
        let height = neckline - head;
        if head < ls && head < rs && height > 0.0 {
            return Some(build(
                PatternKind::InverseHeadAndShoulders,
                w,
                (diff, threshold),
                neckline,
                neckline + height,
                confirm,
                config,
            ));
        }
    }
    None
}

fn double(w: &[Extremum], confirm: usize, config: &PatternConfig) -> Option<PatternMatch> {
    let threshold = config.level_diff_threshold;
    let (first, neck, second) = (w[0].price, w[1].price, w[2].price);
    let diff = relative_diff(first, second);
    if diff > threshold {
        return None;
    }
    let level = (first + second) / 2.0;

    if kinds_are(w, ExtremumKind::Peak) {
        let height = level - neck;
        if height > 0.0 {
            return Some(build(
                PatternKind::DoubleTop,
                w,
                (diff, threshold),
                neck,
                neck - height,
                confirm,
                config,
            ));
        }
    } else if kinds_are(w, ExtremumKind::Trough) {
        let height = neck - level;
        if height > 0.0 {
            return Some(build(
                PatternKind::DoubleBottom,
                w,
                (diff, threshold),
                neck,
                neck + height,
                confirm,
                config,
            ));
        }
    }
    None
}

/// Complex matches with indices into `candles`. Assumes well-formed input.
pub fn detect(candles: &[Candle], config: &PatternConfig) -> Vec<PatternMatch> {
    let n = candles.len();
    if n < config.min_window {
        return Vec::new();
    }
    let offset = n.saturating_sub(config.complex_lookback);
    let slice = &candles[offset..];
    let extrema = find_extrema(slice, config.extrema_spacing);

    // An extremum is only known once `spacing` later candles exist.
    let confirm = |w: &[Extremum]| {
        let last = w.last().map_or(0, |e| e.index);
        (last + config.extrema_spacing).min(slice.len() - 1)
    };

    let mut matches = Vec::new();
    for w in extrema.windows(5) {
        if let Some(m) = head_and_shoulders(w, confirm(w), config) {
            matches.push(m);
        }
    }
    for w in extrema.windows(3) {
        if let Some(m) = double(w, confirm(w), config) {
            matches.push(m);
        }
    }

    for m in &mut matches {
        m.index += offset;
        m.window.start += offset;
        m.window.end += offset;
    }
    matches
}
