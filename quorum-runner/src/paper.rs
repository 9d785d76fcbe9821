//! Paper broker: an in-memory account and order sink sharing one ledger.
//!
//! Entries fill at the intent's reference price and lock their margin; closes
//! realize PnL at the close intent's reference price. An optional taker fee
//! is charged on notional at both ends.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use quorum_core::domain::{CloseIntent, ExitReason, OrderIntent, PositionState, TradeSide};

use crate::collaborators::{AccountSource, OrderSink};
use crate::error::{OrderError, SourceError};

/// A round trip realized by the paper broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperTrade {
    pub symbol: String,
    pub side: TradeSide,
    pub size: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
    pub fees: f64,
    pub reason: ExitReason,
}

#[derive(Debug)]
struct OpenPaperPosition {
    symbol: String,
    state: PositionState,
    margin: f64,
    entry_fee: f64,
}

#[derive(Debug)]
struct Ledger {
    balance: f64,
    open: Option<OpenPaperPosition>,
    trades: Vec<PaperTrade>,
}

/// Cheap to clone; clones share the ledger, so one handle can serve as the
/// account source and another as the order sink.
#[derive(Debug, Clone)]
pub struct PaperBroker {
    ledger: Arc<Mutex<Ledger>>,
    fee_rate: f64,
}

impl PaperBroker {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger {
                balance: starting_balance,
                open: None,
                trades: Vec::new(),
            })),
            fee_rate: 0.0,
        }
    }

    /// Taker fee as a fraction of notional, e.g. `0.0004` for 4 bps.
    pub fn with_fee_rate(mut self, fee_rate: f64) -> Self {
        self.fee_rate = fee_rate.max(0.0);
        self
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // No ledger update can panic halfway, so a poisoned lock is still consistent.
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn balance(&self) -> f64 {
        self.ledger().balance
    }

    pub fn trades(&self) -> Vec<PaperTrade> {
        self.ledger().trades.clone()
    }

    /// Balance plus the open position's PnL at `mark`.
    pub fn equity(&self, mark: f64) -> f64 {
        let ledger = self.ledger();
        let open_pnl = ledger
            .open
            .as_ref()
            .map_or(0.0, |p| p.state.unrealized_pnl(mark));
        ledger.balance + open_pnl
    }
}

impl AccountSource for PaperBroker {
    fn get_balance(&self) -> Result<f64, SourceError> {
        Ok(self.balance())
    }

    fn available_margin(&self) -> Result<f64, SourceError> {
        let ledger = self.ledger();
        let locked = ledger.open.as_ref().map_or(0.0, |p| p.margin);
        Ok((ledger.balance - locked).max(0.0))
    }

    fn get_open_position(&self, symbol: &str) -> Result<Option<PositionState>, SourceError> {
        Ok(self
            .ledger()
            .open
            .as_ref()
            .filter(|p| p.symbol == symbol)
            .map(|p| p.state.clone()))
    }
}

impl OrderSink for PaperBroker {
    fn submit_entry(&self, intent: &OrderIntent) -> Result<(), OrderError> {
        let mut ledger = self.ledger();
        if ledger.open.is_some() {
            return Err(OrderError::Rejected("a position is already open".into()));
        }
        if !(intent.size.is_finite() && intent.size > 0.0) {
            return Err(OrderError::Rejected(format!("invalid size {}", intent.size)));
        }
        let entry_fee = intent.size * intent.entry_price * self.fee_rate;
        let available = ledger.balance - entry_fee;
        if intent.margin_required > available {
            return Err(OrderError::InsufficientMargin {
                required: intent.margin_required,
                available,
            });
        }
        ledger.balance -= entry_fee;
        ledger.open = Some(OpenPaperPosition {
            symbol: intent.symbol.clone(),
            state: PositionState::open(
                intent.side,
                intent.entry_price,
                intent.size,
                Some(intent.stop_loss),
                Some(intent.take_profit),
            ),
            margin: intent.margin_required,
            entry_fee,
        });
        Ok(())
    }

    fn submit_close(&self, intent: &CloseIntent) -> Result<(), OrderError> {
        let mut ledger = self.ledger();
        let open = match ledger.open.take() {
            Some(p) if p.symbol == intent.symbol => p,
            other => {
                ledger.open = other;
                return Err(OrderError::NoPosition {
                    symbol: intent.symbol.clone(),
                });
            }
        };
        let size = open.state.size;
        let exit_fee = size * intent.reference_price * self.fee_rate;
        let gross = open.state.unrealized_pnl(intent.reference_price);
        ledger.balance += gross - exit_fee;
        ledger.trades.push(PaperTrade {
            symbol: open.symbol,
            side: intent.side,
            size,
            entry_price: open.state.entry_price,
            exit_price: intent.reference_price,
            pnl: gross - exit_fee - open.entry_fee,
            fees: exit_fee + open.entry_fee,
            reason: intent.reason,
        });
        Ok(())
    }
}
