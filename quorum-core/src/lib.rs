//! Quorum Core — the decision core of a futures-trading agent.
//!
//! Turns OHLCV candles across several timeframes into one risk-bounded
//! decision per cycle:
//! - Indicator Engine (EMA, RSI, MACD, ATR, volume MA, OBV)
//! - Pattern Recognizer (candlestick templates, extrema-based chart patterns)
//! - Multi-Timeframe Aggregator (weighted, volatility-tilted alignment vote)
//! - Signal Decision Engine (state machine over the position)
//! - Risk & Position Sizer (ATR stop, fixed-fraction risk, margin guard)
//!
//! Everything here is pure and synchronous. I/O lives in `quorum-runner`.

pub mod config;
pub mod decision;
pub mod domain;
pub mod indicators;
pub mod mtf;
pub mod patterns;
pub mod pipeline;
pub mod sizing;

pub use config::{ConfigError, EngineConfig};
pub use pipeline::{evaluate, Evaluation, MarketSnapshot, TimeframeFeed};
