//! Traits for the trading loop's external collaborators.
//!
//! The loop never talks to an exchange directly: candles, balance, open
//! position and order routing all sit behind these seams so live venues,
//! CSV history, replay and the paper broker are interchangeable.

use quorum_core::domain::{CandleSeries, CloseIntent, OrderIntent, PositionState, Timeframe};

use crate::error::{OrderError, SourceError};

/// Supplier of OHLCV history.
pub trait CandleSource: Send {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Up to `lookback` of the most recent candles, oldest first.
    ///
    /// May include the still-forming candle; the loop trims to closed candles.
    fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<CandleSeries, SourceError>;
}

/// Account balance and open-position ground truth.
pub trait AccountSource: Send {
    /// Wallet balance in quote currency.
    fn get_balance(&self) -> Result<f64, SourceError>;

    /// Margin free for a new position. Defaults to the full balance.
    fn available_margin(&self) -> Result<f64, SourceError> {
        self.get_balance()
    }

    /// Open position for `symbol`, or `None` when flat.
    fn get_open_position(&self, symbol: &str) -> Result<Option<PositionState>, SourceError>;
}

/// Receives order and close intents. Fills are the sink's business.
pub trait OrderSink: Send {
    fn submit_entry(&self, intent: &OrderIntent) -> Result<(), OrderError>;

    fn submit_close(&self, intent: &CloseIntent) -> Result<(), OrderError>;
}
