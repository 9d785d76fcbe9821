use serde::{Deserialize, Serialize};

use super::candle::Candle;
use super::decision::ExitReason;

/// Market direction of a signal, pattern or timeframe vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
        }
    }

    /// Direction of a signed score; `None` for zero or NaN.
    pub fn from_score(score: f64) -> Option<Self> {
        if score > 0.0 {
            Some(Direction::Bullish)
        } else if score < 0.0 {
            Some(Direction::Bearish)
        } else {
            None
        }
    }
}

/// Side of a futures position or entry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    pub fn direction(&self) -> Direction {
        match self {
            TradeSide::Long => Direction::Bullish,
            TradeSide::Short => Direction::Bearish,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            TradeSide::Long => TradeSide::Short,
            TradeSide::Short => TradeSide::Long,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Flat,
    Long,
    Short,
}

impl PositionStatus {
    pub fn side(&self) -> Option<TradeSide> {
        match self {
            PositionStatus::Flat => None,
            PositionStatus::Long => Some(TradeSide::Long),
            PositionStatus::Short => Some(TradeSide::Short),
        }
    }
}

impl From<TradeSide> for PositionStatus {
    fn from(side: TradeSide) -> Self {
        match side {
            TradeSide::Long => PositionStatus::Long,
            TradeSide::Short => PositionStatus::Short,
        }
    }
}

/// Current exposure of the trading loop.
///
/// Written at most once per cycle (by the decision outcome) and otherwise only
/// replaced by ground truth reported from the account or execution side.
/// Stop and target are optional because a position reported by the exchange may
/// not carry them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub status: PositionStatus,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub size: f64,
}

impl Default for PositionState {
    fn default() -> Self {
        Self::flat()
    }
}

impl PositionState {
    pub fn flat() -> Self {
        Self {
            status: PositionStatus::Flat,
            entry_price: 0.0,
            stop_loss: None,
            take_profit: None,
            size: 0.0,
        }
    }

    pub fn open(
        side: TradeSide,
        entry_price: f64,
        size: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Self {
        Self {
            status: side.into(),
            entry_price,
            stop_loss,
            take_profit,
            size,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.status == PositionStatus::Flat
    }

    pub fn side(&self) -> Option<TradeSide> {
        self.status.side()
    }

    /// Whether `candle` traded through the stored stop or target.
    ///
    /// The stop is checked first: when one candle spans both levels the
    /// conservative reading is that the stop filled.
    pub fn protective_exit(&self, candle: &Candle) -> Option<ExitReason> {
        match self.status {
            PositionStatus::Flat => None,
            PositionStatus::Long => {
                if self.stop_loss.is_some_and(|sl| candle.low <= sl) {
                    Some(ExitReason::StopLoss)
                } else if self.take_profit.is_some_and(|tp| candle.high >= tp) {
                    Some(ExitReason::TakeProfit)
                } else {
                    None
                }
            }
            PositionStatus::Short => {
                if self.stop_loss.is_some_and(|sl| candle.high >= sl) {
                    Some(ExitReason::StopLoss)
                } else if self.take_profit.is_some_and(|tp| candle.low <= tp) {
                    Some(ExitReason::TakeProfit)
                } else {
                    None
                }
            }
        }
    }

    /// Replace local state with what the account reports.
    ///
    /// When the reported side matches the local side, locally tracked stop and
    /// target survive (exchanges often omit them). Returns true if the status changed.
    pub fn reconcile(&mut self, reported: Option<PositionState>) -> bool {
        let reported = reported.unwrap_or_else(PositionState::flat);
        let changed = reported.status != self.status;
        if !changed && !reported.is_flat() {
            let stop_loss = reported.stop_loss.or(self.stop_loss);
            let take_profit = reported.take_profit.or(self.take_profit);
            *self = PositionState {
                stop_loss,
                take_profit,
                ..reported
            };
        } else {
            *self = reported;
        }
        changed
    }

    /// Unrealized PnL in quote currency at `price`.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.status {
            PositionStatus::Flat => 0.0,
            PositionStatus::Long => self.size * (price - self.entry_price),
            PositionStatus::Short => self.size * (self.entry_price - price),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(high: f64, low: f64) -> Candle {
        Candle::new(Utc::now(), 100.0, high, low, 100.0, 1.0)
    }

    #[test]
    fn long_stop_hit_on_low() {
        let pos = PositionState::open(TradeSide::Long, 100.0, 1.0, Some(95.0), Some(110.0));
        assert_eq!(pos.protective_exit(&candle(101.0, 95.0)), Some(ExitReason::StopLoss));
        assert_eq!(pos.protective_exit(&candle(110.5, 99.0)), Some(ExitReason::TakeProfit));
        assert_eq!(pos.protective_exit(&candle(105.0, 96.0)), None);
    }

    #[test]
    fn short_levels_mirror() {
        let pos = PositionState::open(TradeSide::Short, 100.0, 1.0, Some(105.0), Some(90.0));
        assert_eq!(pos.protective_exit(&candle(105.0, 99.0)), Some(ExitReason::StopLoss));
        assert_eq!(pos.protective_exit(&candle(101.0, 89.0)), Some(ExitReason::TakeProfit));
    }

    #[test]
    fn stop_wins_when_both_levels_touched() {
        let pos = PositionState::open(TradeSide::Long, 100.0, 1.0, Some(95.0), Some(110.0));
        assert_eq!(pos.protective_exit(&candle(111.0, 94.0)), Some(ExitReason::StopLoss));
    }

    #[test]
    fn flat_never_exits() {
        assert_eq!(PositionState::flat().protective_exit(&candle(1e9, 0.1)), None);
    }

    #[test]
    fn reconcile_keeps_levels_for_same_side() {
        let mut local = PositionState::open(TradeSide::Long, 100.0, 2.0, Some(95.0), Some(110.0));
        let reported = PositionState::open(TradeSide::Long, 100.5, 2.0, None, None);
        assert!(!local.reconcile(Some(reported)));
        assert_eq!(local.entry_price, 100.5);
        assert_eq!(local.stop_loss, Some(95.0));
        assert_eq!(local.take_profit, Some(110.0));
    }

    #[test]
    fn reconcile_flat_report_closes_local() {
        let mut local = PositionState::open(TradeSide::Short, 100.0, 2.0, Some(105.0), None);
        assert!(local.reconcile(None));
        assert!(local.is_flat());
    }

    #[test]
    fn unrealized_pnl_sign() {
        let long = PositionState::open(TradeSide::Long, 100.0, 2.0, None, None);
        let short = PositionState::open(TradeSide::Short, 100.0, 2.0, None, None);
        assert_eq!(long.unrealized_pnl(105.0), 10.0);
        assert_eq!(short.unrealized_pnl(105.0), -10.0);
    }
}
