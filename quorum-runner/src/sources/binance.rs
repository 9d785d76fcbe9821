//! Binance USDⓈ-M futures public klines.
//!
//! Reads `GET /fapi/v1/klines` without authentication. Each kline row is a
//! JSON array: `[open_time_ms, "open", "high", "low", "close", "volume",
//! close_time_ms, ...]`. The still-forming candle is dropped.
//!
//! Error mapping: HTTP 429/418 and 5xx are transient, exchange codes -1121
//! (invalid symbol) and -1120 (invalid interval) are fatal.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use quorum_core::domain::{Candle, CandleSeries, Timeframe};

use crate::collaborators::CandleSource;
use crate::error::SourceError;

pub const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";

/// Largest `limit` the endpoint accepts.
const MAX_LIMIT: usize = 1500;

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

pub struct BinanceFuturesSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl BinanceFuturesSource {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("quorum/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::NetworkUnreachable(format!("build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn klines_url(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> String {
        format!(
            "{}/fapi/v1/klines?symbol={symbol}&interval={timeframe}&limit={limit}",
            self.base_url
        )
    }
}

fn classify_transport(e: &reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout(e.to_string())
    } else {
        SourceError::NetworkUnreachable(e.to_string())
    }
}

/// Map a non-success HTTP response to a [`SourceError`].
pub fn classify_status(status: u16, retry_after_secs: Option<u64>, body: &str) -> SourceError {
    match status {
        429 | 418 => SourceError::RateLimited {
            retry_after_secs: retry_after_secs.unwrap_or(60),
        },
        500..=599 => SourceError::ServerError {
            status,
            message: body.chars().take(200).collect(),
        },
        _ => match serde_json::from_str::<ApiError>(body) {
            Ok(err) if err.code == -1121 => SourceError::InvalidSymbol(err.msg),
            Ok(err) if err.code == -1120 => SourceError::InvalidTimeframe(err.msg),
            Ok(err) => SourceError::ResponseFormatChanged(format!("HTTP {status} code {}: {}", err.code, err.msg)),
            Err(_) => SourceError::ResponseFormatChanged(format!("HTTP {status}: {}", body.chars().take(200).collect::<String>())),
        },
    }
}

fn number(row: &[Value], i: usize) -> Option<f64> {
    match row.get(i)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn millis(row: &[Value], i: usize) -> Option<i64> {
    row.get(i)?.as_i64()
}

/// Parse kline rows, keeping only candles whose close time has passed at `now`.
pub fn parse_klines(
    symbol: &str,
    timeframe: Timeframe,
    rows: &[Vec<Value>],
    now: DateTime<Utc>,
) -> Result<CandleSeries, SourceError> {
    let now_ms = now.timestamp_millis();
    let mut series = CandleSeries::empty(symbol, timeframe);
    for (i, row) in rows.iter().enumerate() {
        let bad = || SourceError::ResponseFormatChanged(format!("kline row {i}: {row:?}"));
        let open_ms = millis(row, 0).ok_or_else(bad)?;
        let close_ms = millis(row, 6).ok_or_else(bad)?;
        if close_ms >= now_ms {
            continue;
        }
        let open_time = DateTime::from_timestamp_millis(open_ms).ok_or_else(bad)?;
        let candle = Candle::new(
            open_time,
            number(row, 1).ok_or_else(bad)?,
            number(row, 2).ok_or_else(bad)?,
            number(row, 3).ok_or_else(bad)?,
            number(row, 4).ok_or_else(bad)?,
            number(row, 5).ok_or_else(bad)?,
        );
        if let Err(e) = series.push(candle) {
            warn!(%symbol, timeframe = %timeframe, row = i, error = %e, "skipping kline row");
        }
    }
    Ok(series)
}

impl CandleSource for BinanceFuturesSource {
    fn name(&self) -> &str {
        "binance-futures"
    }

    fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<CandleSeries, SourceError> {
        // One extra for the still-open candle that gets dropped.
        let limit = (lookback + 1).min(MAX_LIMIT);
        let url = self.klines_url(symbol, timeframe, limit);
        debug!(%url, "fetching klines");

        let resp = self.client.get(&url).send().map_err(|e| classify_transport(&e))?;
        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let body = resp.text().unwrap_or_default();
            return Err(classify_status(status.as_u16(), retry_after, &body));
        }
        let rows: Vec<Vec<Value>> = resp
            .json()
            .map_err(|e| SourceError::ResponseFormatChanged(e.to_string()))?;
        Ok(parse_klines(symbol, timeframe, &rows, Utc::now())?.tail(lookback))
    }
}
