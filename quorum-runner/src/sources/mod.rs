//! Candle sources: CSV files, seeded synthetic walks and Binance public klines.
//!
//! The replay source over loaded history lives in [`crate::replay`].

pub mod binance;
pub mod csv;
pub mod synthetic;

pub use self::binance::BinanceFuturesSource;
pub use self::csv::{load_series, write_series, CsvCandleSource};
pub use self::synthetic::{random_walk, SyntheticSource, WalkParams};
