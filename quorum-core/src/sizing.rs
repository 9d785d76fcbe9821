//! Risk & Position Sizer.
//!
//! Converts a risk budget, ATR and risk:reward ratio into an exact bracket.
//!
//! # Formula
//! ```text
//! stop_distance = ATR * atr_sl_multiplier      (fallback: entry * fallback_stop_pct)
//! risk_amount   = balance * risk_per_trade
//! size          = risk_amount / stop_distance  (base units, unrounded)
//! margin        = size * entry / leverage
//! stop_loss     = entry -/+ stop_distance
//! take_profit   = entry +/- stop_distance * risk_reward_ratio
//! ```
//!
//! # Example
//! - Balance 10,000 USDT, risk 1% → 100 USDT at risk
//! - ATR 200, multiplier 1.5 → stop distance 300
//! - Size = 100 / 300 = 0.3333 BTC; at entry 30,000 and 5× leverage, margin 2,000

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RiskConfig;
use crate::domain::{OrderIntent, TradeSide};

/// Why no order intent was produced. Logged and suppressed, never retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SizingRejection {
    #[error("balance {0} is not positive")]
    NonPositiveBalance(f64),

    #[error("entry price {0} is not positive")]
    InvalidEntryPrice(f64),

    #[error("no usable stop distance (ATR undefined and fallback yields {0})")]
    NoStopDistance(f64),

    #[error("margin {required:.4} exceeds available {available:.4}")]
    InsufficientMargin { required: f64, available: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    pub size: f64,
    pub stop_distance: f64,
    pub risk_amount: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub margin_required: f64,
    /// Whether the fallback distance replaced an undefined or non-positive ATR.
    pub used_fallback: bool,
}

/// Stop distance from ATR, or the configured fallback when ATR is unusable.
pub fn stop_distance(atr: Option<f64>, entry_price: f64, risk: &RiskConfig) -> (f64, bool) {
    match atr.filter(|a| a.is_finite() && *a > 0.0) {
        Some(a) => (a * risk.atr_sl_multiplier, false),
        None => (entry_price * risk.fallback_stop_pct, true),
    }
}

/// Size an entry. `available_margin` is the hard guard on the result.
pub fn size_position(
    side: TradeSide,
    entry_price: f64,
    atr: Option<f64>,
    balance: f64,
    available_margin: f64,
    risk: &RiskConfig,
) -> Result<PositionSize, SizingRejection> {
    if !(balance.is_finite() && balance > 0.0) {
        return Err(SizingRejection::NonPositiveBalance(balance));
    }
    if !(entry_price.is_finite() && entry_price > 0.0) {
        return Err(SizingRejection::InvalidEntryPrice(entry_price));
    }
    let (distance, used_fallback) = stop_distance(atr, entry_price, risk);
    if !(distance.is_finite() && distance > 0.0) {
        return Err(SizingRejection::NoStopDistance(distance));
    }

    let risk_amount = balance * risk.risk_per_trade;
    let size = risk_amount / distance;
    let margin_required = size * entry_price / risk.leverage;
    if margin_required > available_margin {
        return Err(SizingRejection::InsufficientMargin {
            required: margin_required,
            available: available_margin,
        });
    }

    let reward = distance * risk.risk_reward_ratio;
    let (stop_loss, take_profit) = match side {
        TradeSide::Long => (entry_price - distance, entry_price + reward),
        TradeSide::Short => (entry_price + distance, entry_price - reward),
    };

    Ok(PositionSize {
        size,
        stop_distance: distance,
        risk_amount,
        stop_loss,
        take_profit,
        margin_required,
        used_fallback,
    })
}

impl PositionSize {
    pub fn into_intent(self, symbol: impl Into<String>, side: TradeSide, entry_price: f64) -> OrderIntent {
        OrderIntent {
            symbol: symbol.into(),
            side,
            size: self.size,
            entry_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            margin_required: self.margin_required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn risk() -> RiskConfig {
        RiskConfig {
            risk_per_trade: 0.01,
            risk_reward_ratio: 2.0,
            atr_sl_multiplier: 1.5,
            fallback_stop_pct: 0.005,
            leverage: 5.0,
        }
    }

    #[test]
    fn long_bracket_from_atr() {
        let s = size_position(TradeSide::Long, 30_000.0, Some(200.0), 10_000.0, 10_000.0, &risk())
            .unwrap();
        assert_eq!(s.stop_distance, 300.0);
        assert_eq!(s.risk_amount, 100.0);
        assert!((s.size - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(s.stop_loss, 29_700.0);
        assert_eq!(s.take_profit, 30_600.0);
        assert!((s.margin_required - 2_000.0).abs() < 1e-9);
        assert!(!s.used_fallback);
    }

    #[test]
    fn short_bracket_mirrors() {
        let s = size_position(TradeSide::Short, 100.0, Some(2.0), 1_000.0, 1_000.0, &risk()).unwrap();
        assert_eq!(s.stop_loss, 103.0);
        assert_eq!(s.take_profit, 94.0);
    }

    #[test]
    fn undefined_or_zero_atr_uses_fallback() {
        for atr in [None, Some(0.0), Some(-1.0), Some(f64::NAN)] {
            let s = size_position(TradeSide::Long, 200.0, atr, 1_000.0, 1_000.0, &risk()).unwrap();
            assert!(s.used_fallback);
            assert_eq!(s.stop_distance, 1.0);
            assert_eq!(s.size, 10.0);
        }
    }

    #[test]
    fn leverage_changes_margin_only() {
        let mut r = risk();
        let a = size_position(TradeSide::Long, 100.0, Some(1.0), 1_000.0, 1e9, &r).unwrap();
        r.leverage = 20.0;
        let b = size_position(TradeSide::Long, 100.0, Some(1.0), 1_000.0, 1e9, &r).unwrap();
        assert_eq!(a.size, b.size);
        assert_eq!(a.risk_amount, b.risk_amount);
        assert!(b.margin_required < a.margin_required);
    }

    #[test]
    fn insufficient_margin_rejected() {
        // size = 10 / 1.5 = 6.67 BTC-equivalent at 100 → margin 133 at 5x
        let err = size_position(TradeSide::Long, 100.0, Some(1.0), 1_000.0, 50.0, &risk()).unwrap_err();
        assert!(matches!(err, SizingRejection::InsufficientMargin { .. }));
    }

    #[test]
    fn non_positive_balance_rejected() {
        let err = size_position(TradeSide::Long, 100.0, Some(1.0), 0.0, 50.0, &risk()).unwrap_err();
        assert_eq!(err, SizingRejection::NonPositiveBalance(0.0));
    }

    #[test]
    fn intent_carries_bracket() {
        let s = size_position(TradeSide::Long, 100.0, Some(2.0), 1_000.0, 1_000.0, &risk()).unwrap();
        let intent = s.into_intent("BTCUSDT", TradeSide::Long, 100.0);
        assert_eq!(intent.stop_loss, 97.0);
        assert_eq!(intent.take_profit, 106.0);
        assert_eq!(intent.symbol, "BTCUSDT");
    }
}
