//! Structured error types for the collaborators and the trading loop.

use quorum_core::domain::Timeframe;
use quorum_core::ConfigError;
use thiserror::Error;

/// Failure reported by a candle or account collaborator.
///
/// Transient kinds exclude the affected timeframe (or skip the query) for one
/// cycle; fatal kinds halt evaluation for the symbol.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("server error {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("no candles for {symbol} {timeframe}")]
    NoData { symbol: String, timeframe: Timeframe },

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("malformed candle data: {0}")]
    MalformedData(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::NetworkUnreachable(_)
                | SourceError::RateLimited { .. }
                | SourceError::Timeout(_)
                | SourceError::ServerError { .. }
                | SourceError::NoData { .. }
        )
    }
}

/// Execution collaborator refused an intent. Never retried by the loop.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("insufficient margin: required {required:.4}, available {available:.4}")]
    InsufficientMargin { required: f64, available: f64 },

    #[error("no open {symbol} position to close")]
    NoPosition { symbol: String },

    #[error("execution venue unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Conditions that stop the trading loop.
#[derive(Debug, Error)]
pub enum TraderError {
    #[error("fatal candle source error for {symbol} {timeframe}: {source}")]
    Source {
        symbol: String,
        timeframe: Timeframe,
        #[source]
        source: SourceError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Journal(#[from] JournalError),
}
