//! Domain types for the decision core

pub mod candle;
pub mod decision;
pub mod position;

pub use candle::{Candle, CandleSeries, SeriesError, Timeframe, TimeframeParseError};
pub use decision::{
    CloseIntent, ExitReason, Factor, FactorOutcome, OrderIntent, SignalDecision, SignalType,
};
pub use position::{Direction, PositionState, PositionStatus, TradeSide};
