//! Candles and the per-timeframe series that holds them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// OHLCV candle for one (symbol, timeframe) interval.
///
/// Immutable once its interval has closed. Volume is in base units and may be
/// fractional on futures venues.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        open_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any OHLCV field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.volume.is_nan()
    }

    /// Basic OHLC sanity: finite, positive prices, high bounds the body, low bounds the body.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
            && self.volume >= 0.0
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body_top(&self) -> f64 {
        self.open.max(self.close)
    }

    pub fn body_bottom(&self) -> f64 {
        self.open.min(self.close)
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.body_top()
    }

    pub fn lower_shadow(&self) -> f64 {
        self.body_bottom() - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Candle interval, stored in minutes and written the way exchanges spell it (`15m`, `4h`, `1d`).
///
/// Ordering follows duration, so `15m < 1h < 4h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    minutes: u32,
}

impl Timeframe {
    pub const M1: Timeframe = Timeframe { minutes: 1 };
    pub const M5: Timeframe = Timeframe { minutes: 5 };
    pub const M15: Timeframe = Timeframe { minutes: 15 };
    pub const H1: Timeframe = Timeframe { minutes: 60 };
    pub const H4: Timeframe = Timeframe { minutes: 240 };
    pub const D1: Timeframe = Timeframe { minutes: 1440 };

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.minutes))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported timeframe '{0}' (expected one of 1m 3m 5m 15m 30m 1h 2h 4h 6h 8h 12h 1d 3d 1w)")]
pub struct TimeframeParseError(pub String);

impl FromStr for Timeframe {
    type Err = TimeframeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let minutes = match s.trim() {
            "1m" => 1,
            "3m" => 3,
            "5m" => 5,
            "15m" => 15,
            "30m" => 30,
            "1h" => 60,
            "2h" => 120,
            "4h" => 240,
            "6h" => 360,
            "8h" => 480,
            "12h" => 720,
            "1d" => 1440,
            "3d" => 4320,
            "1w" => 10080,
            other => return Err(TimeframeParseError(other.to_string())),
        };
        Ok(Self { minutes })
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.minutes;
        if m % 10080 == 0 {
            write!(f, "{}w", m / 10080)
        } else if m % 1440 == 0 {
            write!(f, "{}d", m / 1440)
        } else if m % 60 == 0 {
            write!(f, "{}h", m / 60)
        } else {
            write!(f, "{m}m")
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SeriesError {
    #[error("candle at {new} does not follow last candle at {last}")]
    OutOfOrder {
        last: DateTime<Utc>,
        new: DateTime<Utc>,
    },
}

/// Ordered, append-only candle history for one (symbol, timeframe) pair.
///
/// The series is owned by whoever fetched it; the decision core only reads it.
/// `new` accepts whatever the source produced so malformed input can still be
/// inspected (see [`CandleSeries::is_time_ordered`]); `push` enforces ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            candles,
        }
    }

    pub fn empty(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self::new(symbol, timeframe, Vec::new())
    }

    /// Append a candle. Rejects duplicates and anything older than the last candle.
    pub fn push(&mut self, candle: Candle) -> Result<(), SeriesError> {
        if let Some(last) = self.candles.last() {
            if candle.open_time <= last.open_time {
                return Err(SeriesError::OutOfOrder {
                    last: last.open_time,
                    new: candle.open_time,
                });
            }
        }
        self.candles.push(candle);
        Ok(())
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Strictly increasing open times (gaps allowed, duplicates not).
    pub fn is_time_ordered(&self) -> bool {
        self.candles
            .windows(2)
            .all(|w| w[0].open_time < w[1].open_time)
    }

    /// Candles whose interval has fully closed at `now`.
    pub fn closed_as_of(&self, now: DateTime<Utc>) -> CandleSeries {
        let interval = self.timeframe.duration();
        let candles = self
            .candles
            .iter()
            .take_while(|c| c.open_time + interval <= now)
            .copied()
            .collect();
        CandleSeries::new(self.symbol.clone(), self.timeframe, candles)
    }

    /// The most recent `n` candles (or all of them if fewer exist).
    pub fn tail(&self, n: usize) -> CandleSeries {
        let start = self.candles.len().saturating_sub(n);
        CandleSeries::new(self.symbol.clone(), self.timeframe, self.candles[start..].to_vec())
    }
}
