//! Trading loop against the paper broker and on-disk candle data.

use chrono::{DateTime, Duration, TimeZone, Utc};
use quorum_core::domain::{
    Candle, CandleSeries, CloseIntent, ExitReason, OrderIntent, PositionState, PositionStatus,
    SignalType, Timeframe, TradeSide,
};
use quorum_core::indicators::{compute_frame, FrameSeries};
use quorum_runner::sources::csv::{write_series, CsvCandleSource};
use quorum_runner::sources::{random_walk, WalkParams};
use quorum_runner::{
    read_journal, run_replay, AccountSource, CycleReport, Journal, OrderError, OrderOutcome,
    OrderSink, PaperBroker, ReplaySource, SourceError, Trader, TraderConfig,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

/// Flat hourly candles around 100; the last one dips to `last_low`.
fn flat_hourly(n: usize, last_low: f64) -> CandleSeries {
    let candles = (0..n)
        .map(|i| {
            let low = if i == n - 1 { last_low } else { 99.0 };
            Candle::new(base() + Duration::hours(i as i64), 100.0, 101.0, low, 100.0, 500.0)
        })
        .collect();
    CandleSeries::new("BTCUSDT", Timeframe::H1, candles)
}

fn long_entry() -> OrderIntent {
    OrderIntent {
        symbol: "BTCUSDT".into(),
        side: TradeSide::Long,
        size: 1.0,
        entry_price: 100.0,
        stop_loss: 95.0,
        take_profit: 110.0,
        margin_required: 20.0,
    }
}

/// Choppy hourly decline from 100 then a choppy recovery; the fast EMA
/// crosses back above the slow one once, with RSI mid-range.
fn v_bottom_hourly() -> CandleSeries {
    let mut closes = vec![100.0];
    for i in 0..80 {
        let step = match (i < 40, i % 2 == 0) {
            (true, true) => -1.5,
            (true, false) => 0.5,
            (false, true) => 2.0,
            (false, false) => -1.0,
        };
        closes.push(closes[closes.len() - 1] + step);
    }
    let candles = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(
                base() + Duration::hours(i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1000.0,
            )
        })
        .collect();
    CandleSeries::new("BTCUSDT", Timeframe::H1, candles)
}

/// Entries on the EMA cross confirmed by RSI and MACD alone.
fn cross_config() -> TraderConfig {
    let mut config = TraderConfig::default();
    config.engine.decision.volume_confirmation = false;
    config.engine.decision.pattern_confirmation = false;
    config.engine.decision.mtf_confirmation = false;
    config
}

/// `series` cut right after its bullish EMA cross.
fn through_cross(series: &CandleSeries, config: &TraderConfig) -> CandleSeries {
    let frame = compute_frame(series.candles(), &config.engine.indicators);
    let above = |i| match (
        frame.value(FrameSeries::EmaFast, i),
        frame.value(FrameSeries::EmaSlow, i),
    ) {
        (Some(fast), Some(slow)) => Some(fast > slow),
        _ => None,
    };
    let cross = (1..series.len())
        .find(|&i| above(i) == Some(true) && above(i - 1) == Some(false))
        .expect("series has a bullish cross");
    CandleSeries::new("BTCUSDT", Timeframe::H1, series.candles()[..=cross].to_vec())
}

/// Cross data in a temp dir, and the instant its last candle closes.
fn cross_fixture(config: &TraderConfig) -> (tempfile::TempDir, CandleSeries, DateTime<Utc>) {
    let dir = tempfile::tempdir().unwrap();
    let series = through_cross(&v_bottom_hourly(), config);
    let source = CsvCandleSource::new(dir.path());
    write_series(&source.path_for("BTCUSDT", Timeframe::H1), &series).unwrap();
    let now = series.last().unwrap().open_time + Duration::hours(1);
    (dir, series, now)
}

/// Plenty of balance, almost none of it free.
struct LockedAccount;

impl AccountSource for LockedAccount {
    fn get_balance(&self) -> Result<f64, SourceError> {
        Ok(10_000.0)
    }

    fn available_margin(&self) -> Result<f64, SourceError> {
        Ok(1.0)
    }

    fn get_open_position(&self, _: &str) -> Result<Option<PositionState>, SourceError> {
        Ok(None)
    }
}

struct ClosedVenue;

impl OrderSink for ClosedVenue {
    fn submit_entry(&self, _: &OrderIntent) -> Result<(), OrderError> {
        Err(OrderError::Rejected("market closed".into()))
    }

    fn submit_close(&self, _: &CloseIntent) -> Result<(), OrderError> {
        Err(OrderError::Rejected("market closed".into()))
    }
}

fn write_walks(dir: &std::path::Path) {
    let params = WalkParams {
        start_price: 100.0,
        ..WalkParams::default()
    };
    let end = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    for (tf, n) in [(Timeframe::M15, 800), (Timeframe::H1, 200), (Timeframe::H4, 50)] {
        let last_open = end - tf.duration();
        let series = CandleSeries::new("BTCUSDT", tf, random_walk(11, tf, last_open, n, &params));
        let source = CsvCandleSource::new(dir);
        write_series(&source.path_for("BTCUSDT", tf), &series).unwrap();
    }
}

// ── Live-style cycles ────────────────────────────────────────────────

#[test]
fn adopted_position_stops_out_through_paper_broker() {
    let dir = tempfile::tempdir().unwrap();
    let series = flat_hourly(60, 94.0);
    let source = CsvCandleSource::new(dir.path());
    write_series(&source.path_for("BTCUSDT", Timeframe::H1), &series).unwrap();

    let broker = PaperBroker::new(10_000.0);
    broker.submit_entry(&long_entry()).unwrap();

    let mut trader = Trader::new(
        TraderConfig::default(),
        Box::new(source),
        Box::new(broker.clone()),
        Box::new(broker.clone()),
    )
    .unwrap();

    let now = series.last().unwrap().open_time + Duration::hours(1);
    let report = trader.run_cycle(now).unwrap();

    assert_eq!(report.decision.signal, SignalType::Exit);
    assert_eq!(report.decision.exit_reason, Some(ExitReason::StopLoss));
    match &report.order {
        OrderOutcome::Closed { intent } => {
            assert_eq!(intent.reference_price, 95.0);
            assert_eq!(intent.side, TradeSide::Long);
        }
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(report.position_after.status, PositionStatus::Flat);
    // Only the primary file exists; the other votes are unavailable.
    assert_eq!(report.unavailable, vec![Timeframe::M15, Timeframe::H4]);

    let trades = broker.trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].reason, ExitReason::StopLoss);
    assert!((trades[0].pnl + 5.0).abs() < 1e-9);
    assert!((broker.balance() - 9_995.0).abs() < 1e-9);
}

#[test]
fn open_position_inside_bracket_holds() {
    let dir = tempfile::tempdir().unwrap();
    let series = flat_hourly(60, 99.0);
    let source = CsvCandleSource::new(dir.path());
    write_series(&source.path_for("BTCUSDT", Timeframe::H1), &series).unwrap();

    let broker = PaperBroker::new(10_000.0);
    broker.submit_entry(&long_entry()).unwrap();
    let mut trader = Trader::new(
        TraderConfig::default(),
        Box::new(source),
        Box::new(broker.clone()),
        Box::new(broker.clone()),
    )
    .unwrap();

    let now = series.last().unwrap().open_time + Duration::hours(1);
    let report = trader.run_cycle(now).unwrap();
    assert_ne!(report.decision.signal, SignalType::Exit);
    assert_eq!(trader.position().status, PositionStatus::Long);
    assert_eq!(trader.position().stop_loss, Some(95.0));
    assert!(broker.trades().is_empty());
}

#[test]
fn missing_primary_data_is_a_quiet_none() {
    let dir = tempfile::tempdir().unwrap();
    let broker = PaperBroker::new(1_000.0);
    let mut trader = Trader::new(
        TraderConfig::default(),
        Box::new(CsvCandleSource::new(dir.path())),
        Box::new(broker.clone()),
        Box::new(broker),
    )
    .unwrap();

    let report = trader.run_cycle(base()).unwrap();
    assert_eq!(report.decision.signal, SignalType::None);
    assert_eq!(report.order, OrderOutcome::NoAction);
    assert_eq!(report.unavailable.len(), 3);
}

// ── Entries ──────────────────────────────────────────────────────────

#[test]
fn confirmed_cross_opens_long_with_atr_bracket() {
    let config = cross_config();
    let (dir, series, now) = cross_fixture(&config);
    let broker = PaperBroker::new(10_000.0);
    let mut trader = Trader::new(
        config.clone(),
        Box::new(CsvCandleSource::new(dir.path())),
        Box::new(broker.clone()),
        Box::new(broker.clone()),
    )
    .unwrap();

    let report = trader.run_cycle(now).unwrap();
    assert_eq!(report.decision.signal, SignalType::Long);

    let entry = series.last().unwrap().close;
    let atr = compute_frame(series.candles(), &config.engine.indicators)
        .latest(FrameSeries::Atr)
        .unwrap();
    let risk = &config.engine.risk;
    let distance = atr * risk.atr_sl_multiplier;
    let intent = match &report.order {
        OrderOutcome::Submitted { intent } => intent.clone(),
        other => panic!("expected entry, got {other:?}"),
    };
    assert_eq!(intent.side, TradeSide::Long);
    assert_eq!(intent.entry_price, entry);
    assert!((intent.stop_loss - (entry - distance)).abs() < 1e-9);
    assert!((intent.take_profit - (entry + distance * risk.risk_reward_ratio)).abs() < 1e-9);
    assert!((intent.size - 10_000.0 * risk.risk_per_trade / distance).abs() < 1e-9);

    let position = trader.position();
    assert_eq!(position.status, PositionStatus::Long);
    assert_eq!(position.entry_price, entry);
    assert_eq!(position.stop_loss, Some(intent.stop_loss));
    assert_eq!(position.take_profit, Some(intent.take_profit));
    assert_eq!(report.position_after, *position);

    let held = broker.get_open_position("BTCUSDT").unwrap().unwrap();
    assert_eq!(held.status, PositionStatus::Long);
    assert!((broker.available_margin().unwrap() - (10_000.0 - intent.margin_required)).abs() < 1e-9);
}

#[test]
fn entry_without_free_margin_is_suppressed() {
    let config = cross_config();
    let (dir, _, now) = cross_fixture(&config);
    let broker = PaperBroker::new(10_000.0);
    let mut trader = Trader::new(
        config,
        Box::new(CsvCandleSource::new(dir.path())),
        Box::new(LockedAccount),
        Box::new(broker.clone()),
    )
    .unwrap();

    let report = trader.run_cycle(now).unwrap();
    assert_eq!(report.decision.signal, SignalType::Long);
    match &report.order {
        OrderOutcome::Suppressed { reason } => assert!(reason.contains("margin"), "{reason}"),
        other => panic!("expected suppression, got {other:?}"),
    }
    assert_eq!(trader.position().status, PositionStatus::Flat);
    assert!(broker.get_open_position("BTCUSDT").unwrap().is_none());
}

#[test]
fn entry_refused_by_venue_stays_flat() {
    let config = cross_config();
    let (dir, _, now) = cross_fixture(&config);
    let broker = PaperBroker::new(10_000.0);
    let mut trader = Trader::new(
        config,
        Box::new(CsvCandleSource::new(dir.path())),
        Box::new(broker),
        Box::new(ClosedVenue),
    )
    .unwrap();

    let report = trader.run_cycle(now).unwrap();
    assert_eq!(report.decision.signal, SignalType::Long);
    match &report.order {
        OrderOutcome::Rejected { reason } => assert!(reason.contains("market closed"), "{reason}"),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(report.position_after.status, PositionStatus::Flat);
    assert_eq!(trader.position().status, PositionStatus::Flat);
}

// ── Replay ───────────────────────────────────────────────────────────

#[test]
fn replay_journals_every_cycle_and_balances() {
    let data = tempfile::tempdir().unwrap();
    let series = v_bottom_hourly();
    let csv = CsvCandleSource::new(data.path());
    write_series(&csv.path_for("BTCUSDT", Timeframe::H1), &series).unwrap();
    let journal_dir = tempfile::tempdir().unwrap();
    let journal_path = journal_dir.path().join("runs").join("replay.jsonl");

    let config = cross_config();
    let timeframes = config.engine.mtf.required_timeframes();
    let source = ReplaySource::from_csv_dir(data.path(), "BTCUSDT", &timeframes).unwrap();
    let journal = Journal::open(&journal_path).unwrap();
    let report = run_replay(config.clone(), source, PaperBroker::new(10_000.0), Some(journal)).unwrap();

    let warmup = config.min_lookback();
    assert_eq!(report.summary.cycles as usize, series.len() - (warmup - 1));
    assert!(report.summary.entries > 0, "{:?}", report.summary);

    let records: Vec<CycleReport> = read_journal(&journal_path).unwrap();
    assert_eq!(records.len() as u64, report.summary.cycles);
    assert!(records.windows(2).all(|w| w[0].as_of < w[1].as_of));
    assert!(records.windows(2).all(|w| w[1].cycle == w[0].cycle + 1));
    let hash = config.engine.config_hash();
    assert!(records.iter().all(|r| r.config_hash == hash));

    let entry = records
        .iter()
        .find(|r| matches!(r.order, OrderOutcome::Submitted { .. }))
        .unwrap();
    assert_eq!(entry.decision.signal, SignalType::Long);
    assert_eq!(entry.position_after.status, PositionStatus::Long);

    // No entry while a position is open.
    let open_after_run = report.summary.entries - report.summary.exits;
    assert!(open_after_run <= 1);

    let realized: f64 = report.trades.iter().map(|t| t.pnl).sum();
    assert!((report.final_balance - (10_000.0 + realized)).abs() < 1e-6);
}

#[test]
fn replay_is_deterministic() {
    let data = tempfile::tempdir().unwrap();
    write_walks(data.path());
    let config = TraderConfig::default();
    let timeframes = config.engine.mtf.required_timeframes();

    let run = || {
        let source = ReplaySource::from_csv_dir(data.path(), "BTCUSDT", &timeframes).unwrap();
        run_replay(config.clone(), source, PaperBroker::new(10_000.0), None).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn replay_config_from_toml() {
    let config = TraderConfig::from_toml(
        r#"
        symbol = "BTCUSDT"
        lookback = 120

        [engine.mtf]
        primary = "1h"
        confirmations = ["1h", "4h"]
        alignment_required = 1
        "#,
    )
    .unwrap();
    assert_eq!(
        config.engine.mtf.required_timeframes(),
        vec![Timeframe::H1, Timeframe::H4]
    );

    let data = tempfile::tempdir().unwrap();
    write_walks(data.path());
    let source = ReplaySource::from_csv_dir(
        data.path(),
        "BTCUSDT",
        &config.engine.mtf.required_timeframes(),
    )
    .unwrap();
    let timeframes: Vec<Timeframe> = source.timeframes().collect();
    assert_eq!(timeframes, vec![Timeframe::H1, Timeframe::H4]);

    let report = run_replay(config, source, PaperBroker::new(5_000.0), None).unwrap();
    assert!(report.summary.cycles > 0);
}
