//! CSV candle files: one file per (symbol, timeframe).
//!
//! Layout: `<dir>/<SYMBOL>_<timeframe>.csv`, e.g. `BTCUSDT_1h.csv`, with a
//! header row `open_time,open,high,low,close,volume`. `open_time` is either
//! epoch milliseconds or RFC 3339.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quorum_core::domain::{Candle, CandleSeries, Timeframe};

use crate::collaborators::CandleSource;
use crate::error::SourceError;

#[derive(Debug, Deserialize)]
struct CsvRow {
    open_time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Debug, Serialize)]
struct CsvRowOut {
    open_time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn parse_open_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// File name for one series inside a data directory.
pub fn series_file_name(symbol: &str, timeframe: Timeframe) -> String {
    format!("{symbol}_{timeframe}.csv")
}

/// Load a whole CSV file. Rows must be strictly time-ordered.
pub fn load_series(path: &Path, symbol: &str, timeframe: Timeframe) -> Result<CandleSeries, SourceError> {
    if !path.exists() {
        return Err(SourceError::NoData {
            symbol: symbol.to_string(),
            timeframe,
        });
    }
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| SourceError::MalformedData(format!("{}: {e}", path.display())))?;
    let mut series = CandleSeries::empty(symbol, timeframe);
    for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row.map_err(|e| SourceError::MalformedData(format!("{} row {}: {e}", path.display(), i + 1)))?;
        let open_time = parse_open_time(&row.open_time).ok_or_else(|| {
            SourceError::MalformedData(format!(
                "{} row {}: bad open_time '{}'",
                path.display(),
                i + 1,
                row.open_time
            ))
        })?;
        series
            .push(Candle::new(open_time, row.open, row.high, row.low, row.close, row.volume))
            .map_err(|e| SourceError::MalformedData(format!("{} row {}: {e}", path.display(), i + 1)))?;
    }
    Ok(series)
}

/// Write a series with epoch-millisecond open times.
pub fn write_series(path: &Path, series: &CandleSeries) -> Result<(), SourceError> {
    let io = |e: csv::Error| SourceError::MalformedData(format!("{}: {e}", path.display()));
    let mut writer = csv::Writer::from_path(path).map_err(io)?;
    for c in series.candles() {
        writer
            .serialize(CsvRowOut {
                open_time: c.open_time.timestamp_millis(),
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
            })
            .map_err(io)?;
    }
    writer
        .flush()
        .map_err(|e| SourceError::MalformedData(format!("{}: {e}", path.display())))
}

/// Candle source over a directory of CSV files. Files are re-read per call,
/// so an external process may keep appending to them.
#[derive(Debug, Clone)]
pub struct CsvCandleSource {
    dir: PathBuf,
}

impl CsvCandleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir.join(series_file_name(symbol, timeframe))
    }

    /// Full history of one series.
    pub fn load(&self, symbol: &str, timeframe: Timeframe) -> Result<CandleSeries, SourceError> {
        load_series(&self.path_for(symbol, timeframe), symbol, timeframe)
    }
}

impl CandleSource for CsvCandleSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<CandleSeries, SourceError> {
        Ok(self.load(symbol, timeframe)?.tail(lookback))
    }
}
