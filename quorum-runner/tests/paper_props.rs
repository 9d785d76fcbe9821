//! Property tests for paper broker accounting.

use proptest::prelude::*;
use quorum_core::domain::{CloseIntent, ExitReason, OrderIntent, TradeSide};
use quorum_runner::{AccountSource, OrderSink, PaperBroker};

fn round_trip() -> impl Strategy<Value = (bool, f64, f64, f64)> {
    (any::<bool>(), 0.001..5.0f64, 10.0..1_000.0f64, 10.0..1_000.0f64)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Balance always equals the starting balance plus realized PnL net of fees.
    #[test]
    fn balance_tracks_realized_pnl(
        trips in prop::collection::vec(round_trip(), 1..12),
        fee_rate in 0.0..0.001f64,
    ) {
        let start = 1_000_000.0;
        let broker = PaperBroker::new(start).with_fee_rate(fee_rate);
        for (long, size, entry, exit) in trips {
            let side = if long { TradeSide::Long } else { TradeSide::Short };
            let intent = OrderIntent {
                symbol: "BTCUSDT".into(),
                side,
                size,
                entry_price: entry,
                stop_loss: entry,
                take_profit: entry,
                margin_required: size * entry / 10.0,
            };
            broker.submit_entry(&intent).unwrap();
            prop_assert!(broker.available_margin().unwrap() >= 0.0);
            broker
                .submit_close(&CloseIntent {
                    symbol: "BTCUSDT".into(),
                    side,
                    size,
                    reference_price: exit,
                    reason: ExitReason::Reversal,
                })
                .unwrap();
        }
        let realized: f64 = broker.trades().iter().map(|t| t.pnl).sum();
        prop_assert!((broker.balance() - (start + realized)).abs() < 1e-6);
        prop_assert!(broker.get_open_position("BTCUSDT").unwrap().is_none());
    }

    /// Long and short round trips at the same prices mirror each other.
    #[test]
    fn long_short_symmetry(size in 0.01..5.0f64, entry in 10.0..1_000.0f64, exit in 10.0..1_000.0f64) {
        let pnl = |side| {
            let broker = PaperBroker::new(1_000_000.0);
            broker
                .submit_entry(&OrderIntent {
                    symbol: "BTCUSDT".into(),
                    side,
                    size,
                    entry_price: entry,
                    stop_loss: entry,
                    take_profit: entry,
                    margin_required: 0.0,
                })
                .unwrap();
            broker
                .submit_close(&CloseIntent {
                    symbol: "BTCUSDT".into(),
                    side,
                    size,
                    reference_price: exit,
                    reason: ExitReason::Reversal,
                })
                .unwrap();
            broker.trades()[0].pnl
        };
        let long = pnl(TradeSide::Long);
        let short = pnl(TradeSide::Short);
        prop_assert!((long + short).abs() < 1e-9);
        prop_assert!((long - size * (exit - entry)).abs() < 1e-6);
    }
}
