//! Multi-Timeframe Aggregator.
//!
//! Each confirmation timeframe is reduced to a signed `direction_score` in
//! [-1, 1]. Scores are combined under static base weights (lower < main <
//! higher), optionally tilted by the primary timeframe's volatility regime.
//! Alignment counts only timeframes that were actually available this cycle.
//! The required count is capped at the number available, so when every
//! other confirmation timeframe is down the primary alone can confirm itself.

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, MtfConfig};
use crate::decision::filters::{self, recent_patterns, FilterContext};
use crate::domain::{Direction, Timeframe};
use crate::indicators::FrameSeries;

/// Which per-timeframe filters agree with that timeframe's own direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfirms {
    pub ema: bool,
    pub rsi: bool,
    pub macd: bool,
    pub volume: bool,
    pub pattern: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeSignal {
    pub timeframe: Timeframe,
    /// Positive bullish, negative bearish, 0.0 neutral.
    pub direction_score: f64,
    pub confirms: FilterConfirms,
    /// Effective weight after any volatility tilt.
    pub weight: f64,
}

impl TimeframeSignal {
    pub fn direction(&self) -> Option<Direction> {
        Direction::from_score(self.direction_score)
    }
}

/// Reduce one timeframe's snapshot to a [`TimeframeSignal`].
///
/// Components, each in [-1, 1] and skipped when undefined: EMA trend side,
/// RSI distance from 50, MACD histogram sign, OBV trend slope, and the net
/// strength of recent patterns. Weight starts at the static base weight.
pub fn timeframe_signal(
    timeframe: Timeframe,
    ctx: &FilterContext<'_>,
    config: &EngineConfig,
) -> TimeframeSignal {
    let mut components = Vec::with_capacity(5);
    if let Some(i) = ctx.candles.len().checked_sub(1) {
        let frame = ctx.frame;
        let at = |s| frame.value(s, i);

        if let (Some(fast), Some(slow)) = (at(FrameSeries::EmaFast), at(FrameSeries::EmaSlow)) {
            components.push(sign(fast - slow));
        }
        if let Some(rsi) = at(FrameSeries::Rsi) {
            components.push(((rsi - 50.0) / 50.0).clamp(-1.0, 1.0));
        }
        if let Some(hist) = at(FrameSeries::MacdHist) {
            components.push(sign(hist));
        }
        if let (Some(curr), Some(prev)) = (
            at(FrameSeries::ObvTrend),
            i.checked_sub(1).and_then(|p| frame.value(FrameSeries::ObvTrend, p)),
        ) {
            components.push(sign(curr - prev));
        }
        let recent: Vec<_> = recent_patterns(ctx.patterns, i, config.decision.pattern_recency)
            .filter(|m| m.strength >= config.decision.min_pattern_strength)
            .collect();
        if !recent.is_empty() {
            let net: f64 = recent.iter().map(|m| m.direction.sign() * m.strength).sum();
            components.push(net.clamp(-1.0, 1.0));
        }
    }

    let mut score = if components.is_empty() {
        0.0
    } else {
        components.iter().sum::<f64>() / components.len() as f64
    };
    if score.abs() <= config.mtf.neutral_band {
        score = 0.0;
    }

    let confirms = match Direction::from_score(score) {
        Some(dir) => FilterConfirms {
            ema: filters::ema_trend(ctx, dir).outcome.is_passed(),
            rsi: filters::rsi(ctx, dir).outcome.is_passed(),
            macd: filters::macd(ctx, dir).outcome.is_passed(),
            volume: filters::volume(ctx, dir).outcome.is_passed(),
            pattern: filters::pattern(ctx, dir).outcome.is_passed(),
        },
        None => FilterConfirms::default(),
    };

    TimeframeSignal {
        timeframe,
        direction_score: score,
        confirms,
        weight: config.mtf.base_weight(timeframe),
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn rank(tf: Timeframe, primary: Timeframe) -> f64 {
    match tf.cmp(&primary) {
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
        std::cmp::Ordering::Greater => 1.0,
    }
}

/// Log-space tilt applied for volatility regime `regime` (ATR / mean ATR).
///
/// Weights become `base * exp(tilt * rank)` with rank -1/0/+1 for
/// lower/main/higher. The tilt is non-decreasing in `regime`, bounded by
/// `max_tilt`, and floored so that a higher timeframe never ends up weighted
/// below a lower one.
pub fn volatility_tilt(config: &MtfConfig, regime: Option<f64>) -> f64 {
    if !config.volatility_adjustment {
        return 0.0;
    }
    let Some(r) = regime.filter(|r| r.is_finite() && *r > 0.0) else {
        return 0.0;
    };
    let (lo, main, hi) = (config.weight_lower, config.weight_main, config.weight_higher);
    let floor = [(lo / main).ln(), (main / hi).ln(), (lo / hi).ln() / 2.0]
        .into_iter()
        .fold(f64::NEG_INFINITY, f64::max)
        .max(-config.max_tilt);
    (config.volatility_sensitivity * r.ln()).clamp(floor.min(0.0), config.max_tilt)
}

/// Effective weight of `tf` under `tilt`.
pub fn tilted_weight(config: &MtfConfig, tf: Timeframe, tilt: f64) -> f64 {
    config.base_weight(tf) * (tilt * rank(tf, config.primary)).exp()
}

/// Result of the alignment vote for one candidate direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alignment {
    pub agreeing: usize,
    pub available: usize,
    /// `min(alignment_required, available)`.
    pub required: usize,
}

impl Alignment {
    pub fn holds(&self) -> bool {
        self.available > 0 && self.agreeing >= self.required
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtfAggregate {
    /// Available confirmation timeframes, ordered by duration.
    pub signals: Vec<TimeframeSignal>,
    /// Confirmation timeframes whose candles could not be fetched or analysed.
    pub unavailable: Vec<Timeframe>,
    /// Primary ATR / mean ATR, when defined.
    pub volatility_regime: Option<f64>,
    pub tilt: f64,
    /// Weight-normalized mean direction score over available timeframes.
    pub weighted_score: f64,
    pub alignment_required: usize,
}

impl MtfAggregate {
    pub fn is_available(&self) -> bool {
        !self.signals.is_empty()
    }

    /// Vote for `dir`. Unavailable timeframes are in neither count.
    pub fn alignment(&self, dir: Direction) -> Alignment {
        let available = self.signals.len();
        let agreeing = self
            .signals
            .iter()
            .filter(|s| s.direction() == Some(dir))
            .count();
        Alignment {
            agreeing,
            available,
            required: self.alignment_required.min(available),
        }
    }
}

/// Combine per-timeframe signals into the cycle's aggregate.
pub fn aggregate(
    mut signals: Vec<TimeframeSignal>,
    mut unavailable: Vec<Timeframe>,
    volatility_regime: Option<f64>,
    config: &MtfConfig,
) -> MtfAggregate {
    let tilt = volatility_tilt(config, volatility_regime);
    for s in &mut signals {
        s.weight = tilted_weight(config, s.timeframe, tilt);
    }
    signals.sort_by_key(|s| s.timeframe);
    unavailable.sort();

    let total: f64 = signals.iter().map(|s| s.weight).sum();
    let weighted_score = if total > 0.0 {
        signals.iter().map(|s| s.weight * s.direction_score).sum::<f64>() / total
    } else {
        0.0
    };

    MtfAggregate {
        signals,
        unavailable,
        volatility_regime,
        tilt,
        weighted_score,
        alignment_required: config.alignment_required,
    }
}
