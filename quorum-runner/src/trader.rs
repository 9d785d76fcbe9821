//! The trading loop.
//!
//! One cycle: reconcile the position with the account, fetch every required
//! timeframe once, evaluate the immutable snapshot, act on the decision, then
//! commit the new [`PositionState`]. Cycles are strictly sequential and the
//! trader is the only writer of its position.

use std::thread;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use quorum_core::domain::{
    CloseIntent, ExitReason, OrderIntent, PositionState, SignalDecision, SignalType, Timeframe,
};
use quorum_core::pipeline::{evaluate, Evaluation, MarketSnapshot};
use quorum_core::sizing::size_position;

use crate::collaborators::{AccountSource, CandleSource, OrderSink};
use crate::config::TraderConfig;
use crate::error::TraderError;
use crate::journal::Journal;

/// What the loop did with the cycle's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderOutcome {
    /// Decision was NONE, or nothing to act on.
    NoAction,
    Submitted { intent: OrderIntent },
    Closed { intent: CloseIntent },
    /// Sizing guard or account query prevented an entry. Logged, not retried.
    Suppressed { reason: String },
    /// The order sink refused the intent.
    Rejected { reason: String },
}

/// Journal record of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub symbol: String,
    pub as_of: DateTime<Utc>,
    pub decision: SignalDecision,
    pub order: OrderOutcome,
    pub position_after: PositionState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<Timeframe>,
    pub config_hash: String,
}

/// Counters over a sequence of cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub cycles: u64,
    pub entries: u64,
    pub exits: u64,
    pub suppressed: u64,
    pub rejected: u64,
}

impl RunSummary {
    pub fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        match report.order {
            OrderOutcome::Submitted { .. } => self.entries += 1,
            OrderOutcome::Closed { .. } => self.exits += 1,
            OrderOutcome::Suppressed { .. } => self.suppressed += 1,
            OrderOutcome::Rejected { .. } => self.rejected += 1,
            OrderOutcome::NoAction => {}
        }
    }
}

pub struct Trader {
    config: TraderConfig,
    candles: Box<dyn CandleSource>,
    account: Box<dyn AccountSource>,
    orders: Box<dyn OrderSink>,
    journal: Option<Journal>,
    position: PositionState,
    cycle: u64,
    config_hash: String,
}

impl Trader {
    /// Validates the configuration; an invalid one never starts a loop.
    pub fn new(
        config: TraderConfig,
        candles: Box<dyn CandleSource>,
        account: Box<dyn AccountSource>,
        orders: Box<dyn OrderSink>,
    ) -> Result<Self, TraderError> {
        config.validate()?;
        let config_hash = config.engine.config_hash();
        info!(
            symbol = %config.symbol,
            source = candles.name(),
            config_hash = %config_hash,
            "trader initialized"
        );
        Ok(Self {
            config,
            candles,
            account,
            orders,
            journal: None,
            position: PositionState::flat(),
            cycle: 0,
            config_hash,
        })
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn config(&self) -> &TraderConfig {
        &self.config
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    /// Replace local state with an execution report received between cycles.
    ///
    /// Returns true if the position status changed.
    pub fn apply_fill(&mut self, reported: PositionState) -> bool {
        let changed = self.position.reconcile(Some(reported));
        if changed {
            info!(symbol = %self.config.symbol, status = ?self.position.status, "position updated from fill");
        }
        changed
    }

    fn reconcile(&mut self) {
        let symbol = &self.config.symbol;
        match self.account.get_open_position(symbol) {
            Ok(reported) => {
                let before = self.position.status;
                if self.position.reconcile(reported) {
                    warn!(
                        %symbol,
                        local = ?before,
                        reported = ?self.position.status,
                        "position reconciled with account"
                    );
                }
            }
            Err(e) => warn!(%symbol, error = %e, "position query failed; keeping local state"),
        }
    }

    /// Fetch every required timeframe once. Transient failures mark the
    /// timeframe unavailable; fatal ones stop the cycle.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Result<MarketSnapshot, TraderError> {
        let symbol = &self.config.symbol;
        let mut snapshot = MarketSnapshot::new(symbol.clone(), now);
        for tf in self.config.engine.mtf.required_timeframes() {
            match self.candles.get_candles(symbol, tf, self.config.lookback) {
                Ok(series) => {
                    let closed = series.closed_as_of(now);
                    debug!(%symbol, timeframe = %tf, fetched = series.len(), closed = closed.len(), "candles fetched");
                    snapshot = snapshot.with_series(closed);
                }
                Err(e) if e.is_transient() => {
                    snapshot = snapshot.with_unavailable(tf, e.to_string());
                }
                Err(e) => {
                    error!(%symbol, timeframe = %tf, error = %e, "fatal candle source error");
                    return Err(TraderError::Source {
                        symbol: symbol.clone(),
                        timeframe: tf,
                        source: e,
                    });
                }
            }
        }
        Ok(snapshot)
    }

    /// Run one full cycle as of `now`.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, TraderError> {
        self.cycle += 1;
        self.reconcile();

        let snapshot = self.snapshot(now)?;
        let eval = evaluate(&snapshot, &self.position, &self.config.engine);
        let (order, next) = self.act(&eval);

        // Single write per cycle.
        if let Some(next) = next {
            self.position = next;
        }

        let report = CycleReport {
            cycle: self.cycle,
            symbol: self.config.symbol.clone(),
            as_of: now,
            decision: eval.decision,
            order,
            position_after: self.position.clone(),
            unavailable: eval.unavailable.iter().map(|(tf, _)| *tf).collect(),
            config_hash: self.config_hash.clone(),
        };
        info!(
            cycle = report.cycle,
            symbol = %report.symbol,
            signal = %report.decision.signal,
            confidence = report.decision.confidence,
            position = ?report.position_after.status,
            "cycle complete"
        );
        if let Some(journal) = self.journal.as_mut() {
            journal.append(&report)?;
        }
        Ok(report)
    }

    /// Turn the decision into at most one intent and the position it implies.
    fn act(&self, eval: &Evaluation) -> (OrderOutcome, Option<PositionState>) {
        match eval.decision.signal {
            SignalType::Long | SignalType::Short => self.enter(eval),
            SignalType::Exit => self.exit(eval),
            SignalType::None => (OrderOutcome::NoAction, None),
        }
    }

    fn enter(&self, eval: &Evaluation) -> (OrderOutcome, Option<PositionState>) {
        let symbol = &self.config.symbol;
        let Some(side) = eval.decision.signal.entry_side() else {
            return (OrderOutcome::NoAction, None);
        };
        let Some(entry_price) = eval.last_candle().map(|c| c.close) else {
            return suppressed(symbol, "no closed primary candle to price the entry".into());
        };
        let funds = self
            .account
            .get_balance()
            .and_then(|b| self.account.available_margin().map(|m| (b, m)));
        let (balance, available) = match funds {
            Ok(f) => f,
            Err(e) => return suppressed(symbol, format!("balance query failed: {e}")),
        };

        let sized = match size_position(
            side,
            entry_price,
            eval.primary_atr(),
            balance,
            available,
            &self.config.engine.risk,
        ) {
            Ok(s) => s,
            Err(rejection) => return suppressed(symbol, rejection.to_string()),
        };
        if sized.used_fallback {
            debug!(%symbol, stop_distance = sized.stop_distance, "ATR undefined; fallback stop distance used");
        }

        let intent = sized.into_intent(symbol.clone(), side, entry_price);
        match self.orders.submit_entry(&intent) {
            Ok(()) => {
                info!(
                    %symbol,
                    side = ?side,
                    size = intent.size,
                    entry = intent.entry_price,
                    stop_loss = intent.stop_loss,
                    take_profit = intent.take_profit,
                    "entry submitted"
                );
                let next = PositionState::open(
                    side,
                    entry_price,
                    intent.size,
                    Some(intent.stop_loss),
                    Some(intent.take_profit),
                );
                (OrderOutcome::Submitted { intent }, Some(next))
            }
            Err(e) => {
                warn!(%symbol, error = %e, "entry rejected by order sink");
                (OrderOutcome::Rejected { reason: e.to_string() }, None)
            }
        }
    }

    fn exit(&self, eval: &Evaluation) -> (OrderOutcome, Option<PositionState>) {
        let symbol = &self.config.symbol;
        let position = &self.position;
        let Some(side) = position.side() else {
            return (OrderOutcome::NoAction, None);
        };
        let reason = eval.decision.exit_reason.unwrap_or(ExitReason::Reversal);
        let last_close = eval.last_candle().map(|c| c.close);
        // Protective exits are assumed to fill at their level.
        let reference_price = match reason {
            ExitReason::StopLoss => position.stop_loss.or(last_close),
            ExitReason::TakeProfit => position.take_profit.or(last_close),
            ExitReason::Reversal => last_close,
        }
        .unwrap_or(position.entry_price);

        let intent = CloseIntent {
            symbol: symbol.clone(),
            side,
            size: position.size,
            reference_price,
            reason,
        };
        match self.orders.submit_close(&intent) {
            Ok(()) => {
                info!(%symbol, reason = ?reason, price = reference_price, "close submitted");
                (OrderOutcome::Closed { intent }, Some(PositionState::flat()))
            }
            Err(e) => {
                warn!(%symbol, error = %e, "close rejected by order sink");
                (OrderOutcome::Rejected { reason: e.to_string() }, None)
            }
        }
    }

    /// Cycle on the wall clock every check interval until `max_cycles` (or forever).
    ///
    /// Stops at the first fatal error.
    pub fn run(&mut self, max_cycles: Option<u64>) -> Result<RunSummary, TraderError> {
        let mut summary = RunSummary::default();
        let interval = self.config.check_interval();
        loop {
            let report = self.run_cycle(Utc::now())?;
            summary.record(&report);
            if max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }
            thread::sleep(interval);
        }
        Ok(summary)
    }
}

fn suppressed(symbol: &str, reason: String) -> (OrderOutcome, Option<PositionState>) {
    warn!(%symbol, %reason, "order intent suppressed");
    (OrderOutcome::Suppressed { reason }, None)
}
