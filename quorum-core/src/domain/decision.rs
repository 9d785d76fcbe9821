//! Decision outputs: the per-cycle signal and the order intents derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::TradeSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Long,
    Short,
    Exit,
    None,
}

impl SignalType {
    pub fn entry_side(&self) -> Option<TradeSide> {
        match self {
            SignalType::Long => Some(TradeSide::Long),
            SignalType::Short => Some(TradeSide::Short),
            SignalType::Exit | SignalType::None => None,
        }
    }
}

impl From<TradeSide> for SignalType {
    fn from(side: TradeSide) -> Self {
        match side {
            TradeSide::Long => SignalType::Long,
            TradeSide::Short => SignalType::Short,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalType::Long => "LONG",
            SignalType::Short => "SHORT",
            SignalType::Exit => "EXIT",
            SignalType::None => "NONE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Reversal,
}

/// How a single condition fared in this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorOutcome {
    Passed,
    Failed,
    /// Turned off in configuration; counts as satisfied.
    Disabled,
    /// Inputs undefined this cycle (warmup, bad data, missing timeframes); counts as satisfied.
    Unavailable,
}

impl FactorOutcome {
    /// Absence never counts against a signal.
    pub fn is_satisfied(&self) -> bool {
        !matches!(self, FactorOutcome::Failed)
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, FactorOutcome::Passed)
    }

    pub fn from_bool(passed: bool) -> Self {
        if passed {
            FactorOutcome::Passed
        } else {
            FactorOutcome::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    pub outcome: FactorOutcome,
    /// Optional measured value behind the outcome (RSI level, alignment count, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Factor {
    pub fn new(name: impl Into<String>, outcome: FactorOutcome) -> Self {
        Self {
            name: name.into(),
            outcome,
            value: None,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        if value.is_finite() {
            self.value = Some(value);
        }
        self
    }
}

/// The sole output of the decision layer for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDecision {
    pub signal: SignalType,
    pub timestamp: DateTime<Utc>,
    pub contributing_factors: Vec<Factor>,
    /// 0.0 for NONE, otherwise in (0, 1].
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<ExitReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SignalDecision {
    /// Hold / no-op decision.
    pub fn none(timestamp: DateTime<Utc>, factors: Vec<Factor>) -> Self {
        Self {
            signal: SignalType::None,
            timestamp,
            contributing_factors: factors,
            confidence: 0.0,
            exit_reason: None,
            note: None,
        }
    }

    /// Fail-safe NONE carrying the reason evaluation could not run.
    pub fn fail_safe(timestamp: DateTime<Utc>, note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::none(timestamp, Vec::new())
        }
    }

    pub fn is_entry(&self) -> bool {
        self.signal.entry_side().is_some()
    }
}

/// Entry order handed to the execution collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: TradeSide,
    pub size: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub margin_required: f64,
}

/// Request to flatten the current position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseIntent {
    pub symbol: String,
    /// Side of the position being closed.
    pub side: TradeSide,
    pub size: f64,
    pub reference_price: f64,
    pub reason: ExitReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absence_is_satisfied() {
        assert!(FactorOutcome::Passed.is_satisfied());
        assert!(FactorOutcome::Disabled.is_satisfied());
        assert!(FactorOutcome::Unavailable.is_satisfied());
        assert!(!FactorOutcome::Failed.is_satisfied());
    }

    #[test]
    fn factor_drops_non_finite_value() {
        let f = Factor::new("rsi", FactorOutcome::Unavailable).with_value(f64::NAN);
        assert_eq!(f.value, None);
    }

    #[test]
    fn decision_serializes_signal_upper_case() {
        let d = SignalDecision::fail_safe(Utc::now(), "primary timeframe unavailable");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["signal"], "NONE");
        assert_eq!(json["confidence"], 0.0);
        assert_eq!(json["note"], "primary timeframe unavailable");
    }
}
