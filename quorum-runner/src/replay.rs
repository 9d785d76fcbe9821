//! Replay: walk recorded history forward through the real trading loop.
//!
//! A [`ReplaySource`] only exposes candles closed at its shared
//! [`ReplayClock`]; [`run_replay`] advances that clock to each primary candle
//! close after warmup and runs one cycle there against a [`PaperBroker`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use quorum_core::domain::{CandleSeries, Timeframe};

use crate::collaborators::CandleSource;
use crate::config::TraderConfig;
use crate::error::{SourceError, TraderError};
use crate::journal::Journal;
use crate::paper::{PaperBroker, PaperTrade};
use crate::sources::csv::CsvCandleSource;
use crate::trader::{RunSummary, Trader};

/// Replay time shared between the driver and the source.
#[derive(Debug, Clone, Default)]
pub struct ReplayClock(Arc<AtomicI64>);

impl ReplayClock {
    pub fn set(&self, t: DateTime<Utc>) {
        self.0.store(t.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// Historical candles for one symbol, cut at the replay clock.
pub struct ReplaySource {
    symbol: String,
    history: BTreeMap<Timeframe, CandleSeries>,
    clock: ReplayClock,
}

impl ReplaySource {
    pub fn new(symbol: impl Into<String>, series: impl IntoIterator<Item = CandleSeries>) -> Self {
        Self {
            symbol: symbol.into(),
            history: series.into_iter().map(|s| (s.timeframe, s)).collect(),
            clock: ReplayClock::default(),
        }
    }

    /// Load every timeframe that has a CSV file in `dir`. Missing files are
    /// skipped; those timeframes stay unavailable during the replay.
    pub fn from_csv_dir(
        dir: &Path,
        symbol: &str,
        timeframes: &[Timeframe],
    ) -> Result<Self, SourceError> {
        let csv = CsvCandleSource::new(dir);
        let mut series = Vec::new();
        for &tf in timeframes {
            match csv.load(symbol, tf) {
                Ok(s) => series.push(s),
                Err(SourceError::NoData { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Self::new(symbol, series))
    }

    pub fn clock(&self) -> ReplayClock {
        self.clock.clone()
    }

    pub fn timeframes(&self) -> impl Iterator<Item = Timeframe> + '_ {
        self.history.keys().copied()
    }

    /// Close instants of every candle of `timeframe`.
    pub fn close_times(&self, timeframe: Timeframe) -> Vec<DateTime<Utc>> {
        self.history.get(&timeframe).map_or_else(Vec::new, |s| {
            s.candles()
                .iter()
                .map(|c| c.open_time + timeframe.duration())
                .collect()
        })
    }
}

impl CandleSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<CandleSeries, SourceError> {
        if symbol != self.symbol {
            return Err(SourceError::InvalidSymbol(symbol.to_string()));
        }
        let series = self.history.get(&timeframe).ok_or_else(|| SourceError::NoData {
            symbol: symbol.to_string(),
            timeframe,
        })?;
        let now = self.clock.now();
        let candles = series.candles();
        let end = candles.partition_point(|c| c.open_time + timeframe.duration() <= now);
        let start = end.saturating_sub(lookback);
        Ok(CandleSeries::new(symbol, timeframe, candles[start..end].to_vec()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub summary: RunSummary,
    pub starting_balance: f64,
    pub final_balance: f64,
    /// Balance plus open PnL at the last primary close.
    pub final_equity: f64,
    pub trades: Vec<PaperTrade>,
}

/// Replay `source` through a paper-trading [`Trader`] backed by `broker`.
pub fn run_replay(
    config: TraderConfig,
    source: ReplaySource,
    broker: PaperBroker,
    journal: Option<Journal>,
) -> Result<ReplayReport, TraderError> {
    let starting_balance = broker.balance();
    let primary = config.engine.mtf.primary;
    let symbol = config.symbol.clone();
    let warmup = config.min_lookback();
    let clock = source.clock();
    let closes = source.close_times(primary);
    if closes.is_empty() {
        return Err(TraderError::Source {
            symbol: source.symbol.clone(),
            timeframe: primary,
            source: SourceError::NoData {
                symbol: source.symbol.clone(),
                timeframe: primary,
            },
        });
    }
    let last_close_price = source
        .history
        .get(&primary)
        .and_then(|s| s.last())
        .map(|c| c.close);

    let mut trader = Trader::new(
        config,
        Box::new(source),
        Box::new(broker.clone()),
        Box::new(broker.clone()),
    )?;
    if let Some(journal) = journal {
        trader = trader.with_journal(journal);
    }

    let mut summary = RunSummary::default();
    for &t in closes.iter().skip(warmup.saturating_sub(1)) {
        clock.set(t);
        let report = trader.run_cycle(t)?;
        summary.record(&report);
    }

    let report = ReplayReport {
        summary,
        starting_balance,
        final_balance: broker.balance(),
        final_equity: last_close_price.map_or(broker.balance(), |p| broker.equity(p)),
        trades: broker.trades(),
    };
    info!(
        %symbol,
        cycles = report.summary.cycles,
        entries = report.summary.entries,
        exits = report.summary.exits,
        suppressed = report.summary.suppressed,
        final_balance = report.final_balance,
        "replay finished"
    );
    Ok(report)
}
