//! Quorum Runner — the trading loop around `quorum-core`.
//!
//! This crate provides:
//! - Collaborator interfaces (candle source, account, order sink)
//! - The cycle loop with position reconciliation and fail-safe fetching
//! - A paper broker for dry runs
//! - Candle sources: CSV files, seeded synthetic walks, Binance public klines
//! - History replay against the paper broker
//! - An append-only JSONL decision journal

pub mod collaborators;
pub mod config;
pub mod error;
pub mod journal;
pub mod paper;
pub mod replay;
pub mod sources;
pub mod trader;

pub use collaborators::{AccountSource, CandleSource, OrderSink};
pub use config::TraderConfig;
pub use error::{JournalError, OrderError, SourceError, TraderError};
pub use journal::{read_journal, Journal};
pub use paper::{PaperBroker, PaperTrade};
pub use replay::{run_replay, ReplayClock, ReplayReport, ReplaySource};
pub use trader::{CycleReport, OrderOutcome, RunSummary, Trader};
