//! One evaluation cycle over an immutable multi-timeframe snapshot.
//!
//! Timeframes are analysed in parallel (indicators, patterns, local signal)
//! with a join barrier before aggregation. The primary timeframe then drives
//! the decision. A missing primary yields NONE; a missing confirmation
//! timeframe is only excluded from the vote.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::decision::{decide, DecisionInput, FilterContext};
use crate::domain::{Candle, CandleSeries, PositionState, SignalDecision, Timeframe};
use crate::indicators::{compute_frame, volatility_regime, FrameSeries, IndicatorFrame};
use crate::mtf::{aggregate, timeframe_signal, MtfAggregate, TimeframeSignal};
use crate::patterns::{recognize, PatternMatch};

#[derive(Debug, Clone, PartialEq)]
pub enum TimeframeFeed {
    Ready(CandleSeries),
    Unavailable { reason: String },
}

/// Candles for every required timeframe, fetched once at cycle start.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub as_of: DateTime<Utc>,
    pub feeds: BTreeMap<Timeframe, TimeframeFeed>,
}

impl MarketSnapshot {
    pub fn new(symbol: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            as_of,
            feeds: BTreeMap::new(),
        }
    }

    pub fn with_series(mut self, series: CandleSeries) -> Self {
        self.feeds.insert(series.timeframe, TimeframeFeed::Ready(series));
        self
    }

    pub fn with_unavailable(mut self, tf: Timeframe, reason: impl Into<String>) -> Self {
        self.feeds.insert(
            tf,
            TimeframeFeed::Unavailable {
                reason: reason.into(),
            },
        );
        self
    }
}

/// Everything derived from one timeframe's candles this cycle.
#[derive(Debug, Clone)]
pub struct TimeframeAnalysis {
    pub timeframe: Timeframe,
    pub series: CandleSeries,
    pub frame: IndicatorFrame,
    pub patterns: Vec<PatternMatch>,
    pub signal: TimeframeSignal,
}

/// Indicators, patterns and local signal for one series. Pure.
pub fn analyze_timeframe(series: CandleSeries, config: &EngineConfig) -> TimeframeAnalysis {
    let frame = compute_frame(series.candles(), &config.indicators);
    let patterns = recognize(series.candles(), &config.patterns);
    let ctx = FilterContext::new(series.candles(), &frame, &patterns, config);
    let signal = timeframe_signal(series.timeframe, &ctx, config);
    TimeframeAnalysis {
        timeframe: series.timeframe,
        series,
        frame,
        patterns,
        signal,
    }
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: SignalDecision,
    pub aggregate: Option<MtfAggregate>,
    /// Analysed timeframes, primary first.
    pub analyses: Vec<TimeframeAnalysis>,
    pub unavailable: Vec<(Timeframe, String)>,
}

impl Evaluation {
    pub fn primary(&self) -> Option<&TimeframeAnalysis> {
        self.analyses.first()
    }

    /// Latest closed primary candle.
    pub fn last_candle(&self) -> Option<&Candle> {
        self.primary().and_then(|a| a.series.last())
    }

    pub fn primary_atr(&self) -> Option<f64> {
        self.primary().and_then(|a| a.frame.latest(FrameSeries::Atr))
    }
}

/// Evaluate one cycle. Never fails; problems surface as a NONE decision.
pub fn evaluate(
    snapshot: &MarketSnapshot,
    position: &PositionState,
    config: &EngineConfig,
) -> Evaluation {
    let primary_tf = config.mtf.primary;
    let required = config.mtf.required_timeframes();

    let results: Vec<(Timeframe, Result<TimeframeAnalysis, String>)> = required
        .par_iter()
        .map(|&tf| {
            let result = match snapshot.feeds.get(&tf) {
                Some(TimeframeFeed::Ready(series)) if !series.is_empty() => {
                    Ok(analyze_timeframe(series.clone(), config))
                }
                Some(TimeframeFeed::Ready(_)) => Err("no closed candles".to_string()),
                Some(TimeframeFeed::Unavailable { reason }) => Err(reason.clone()),
                None => Err("not fetched".to_string()),
            };
            (tf, result)
        })
        .collect();

    let mut analyses = Vec::new();
    let mut unavailable = Vec::new();
    for (tf, result) in results {
        match result {
            Ok(a) => analyses.push(a),
            Err(reason) => {
                warn!(symbol = %snapshot.symbol, timeframe = %tf, %reason, "timeframe unavailable");
                unavailable.push((tf, reason));
            }
        }
    }

    let Some(primary) = analyses.iter().find(|a| a.timeframe == primary_tf) else {
        let reason = unavailable
            .iter()
            .find(|(tf, _)| *tf == primary_tf)
            .map_or("missing", |(_, r)| r.as_str());
        let decision = SignalDecision::fail_safe(
            snapshot.as_of,
            format!("primary timeframe {primary_tf} unavailable: {reason}"),
        );
        return Evaluation {
            decision,
            aggregate: None,
            analyses,
            unavailable,
        };
    };

    let confirmations = &config.mtf.confirmations;
    let signals: Vec<TimeframeSignal> = analyses
        .iter()
        .filter(|a| confirmations.contains(&a.timeframe))
        .map(|a| a.signal.clone())
        .collect();
    let missing: Vec<Timeframe> = unavailable
        .iter()
        .map(|(tf, _)| *tf)
        .filter(|tf| confirmations.contains(tf))
        .collect();
    let regime = volatility_regime(&primary.frame, config.mtf.volatility_lookback);
    let agg = aggregate(signals, missing, regime, &config.mtf);
    debug!(
        symbol = %snapshot.symbol,
        weighted_score = agg.weighted_score,
        regime = ?agg.volatility_regime,
        available = agg.signals.len(),
        unavailable = agg.unavailable.len(),
        "timeframes aggregated"
    );

    let input = DecisionInput {
        timestamp: snapshot.as_of,
        candles: primary.series.candles(),
        frame: &primary.frame,
        patterns: &primary.patterns,
        mtf: Some(&agg),
        position,
    };
    let decision = decide(&input, config);

    // Primary first for `Evaluation::primary`.
    analyses.sort_by_key(|a| a.timeframe != primary_tf);

    Evaluation {
        decision,
        aggregate: Some(agg),
        analyses,
        unavailable,
    }
}
