//! Signal Decision Engine.
//!
//! A state machine over [`PositionState`]: from FLAT it looks for a fully
//! confirmed LONG or SHORT entry, from LONG/SHORT it looks for a protective
//! exit or a confirmed reversal. Confirmations are strict AND; disabled or
//! unavailable filters pass through.

pub mod engine;
pub mod filters;

pub use engine::decide;
pub use filters::FilterContext;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Candle, PositionState};
use crate::indicators::IndicatorFrame;
use crate::mtf::MtfAggregate;
use crate::patterns::PatternMatch;

/// Immutable snapshot of the primary timeframe for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub timestamp: DateTime<Utc>,
    pub candles: &'a [Candle],
    pub frame: &'a IndicatorFrame,
    pub patterns: &'a [PatternMatch],
    /// `None` when no confirmation timeframe could be analysed.
    pub mtf: Option<&'a MtfAggregate>,
    pub position: &'a PositionState,
}

/// Snapshot problems that make evaluation impossible. Always mapped to NONE.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluationError {
    #[error("no candles in primary series")]
    EmptySeries,

    #[error("indicator frame has {frame} rows for {candles} candles")]
    FrameMisaligned { candles: usize, frame: usize },

    #[error("latest candle at index {index} is malformed")]
    MalformedCandle { index: usize },
}
