//! Seeded random-walk candles for demos, tests and benchmarks.
//!
//! Each timeframe keeps its own generated history, extended on demand up to
//! the last interval boundary at the source's clock, so repeated calls in a
//! live loop see a stable past and one new candle per elapsed interval.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use quorum_core::domain::{Candle, CandleSeries, Timeframe};

use crate::collaborators::CandleSource;
use crate::error::SourceError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkParams {
    pub start_price: f64,
    /// Per-candle close-to-close standard deviation as a fraction of price.
    pub volatility: f64,
    /// Per-candle drift as a fraction of price.
    pub drift: f64,
    pub base_volume: f64,
}

impl Default for WalkParams {
    fn default() -> Self {
        Self {
            start_price: 30_000.0,
            volatility: 0.004,
            drift: 0.0,
            base_volume: 250.0,
        }
    }
}

/// One step of the walk from the previous close.
fn next_candle(rng: &mut StdRng, open_time: DateTime<Utc>, open: f64, params: &WalkParams) -> Candle {
    // Sum of uniforms: bounded and roughly normal.
    let shock = (0..4).map(|_| rng.gen_range(-1.0_f64..1.0)).sum::<f64>() * 0.866;
    let close = (open * (1.0 + params.drift + params.volatility * shock)).max(open * 0.5);
    let wick = open * params.volatility * rng.gen_range(0.0..1.0);
    Candle::new(
        open_time,
        open,
        open.max(close) + wick,
        open.min(close) - wick,
        close,
        params.base_volume * rng.gen_range(0.5..2.0),
    )
}

/// Generate `n` candles of a seeded walk whose last candle opens at `last_open`.
pub fn random_walk(
    seed: u64,
    timeframe: Timeframe,
    last_open: DateTime<Utc>,
    n: usize,
    params: &WalkParams,
) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed ^ u64::from(timeframe.minutes()));
    let step = timeframe.duration();
    let first_open = last_open - step * (n.saturating_sub(1) as i32);
    let mut close = params.start_price;
    (0..n)
        .map(|i| {
            let candle = next_candle(&mut rng, first_open + step * i as i32, close, params);
            close = candle.close;
            candle
        })
        .collect()
}

/// Open time of the latest interval that has fully closed at `now`.
pub fn last_closed_open(timeframe: Timeframe, now: DateTime<Utc>) -> DateTime<Utc> {
    let step_ms = timeframe.duration().num_milliseconds().max(1);
    let now_ms = now.timestamp_millis();
    let current_open = now_ms - now_ms.rem_euclid(step_ms);
    DateTime::from_timestamp_millis(current_open - step_ms).unwrap_or(now)
}

pub struct SyntheticSource {
    seed: u64,
    params: WalkParams,
    clock: fn() -> DateTime<Utc>,
    history: Mutex<BTreeMap<(String, Timeframe), Vec<Candle>>>,
}

impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self::with_params(seed, WalkParams::default())
    }

    pub fn with_params(seed: u64, params: WalkParams) -> Self {
        Self {
            seed,
            params,
            clock: Utc::now,
            history: Mutex::new(BTreeMap::new()),
        }
    }

    /// Replace the wall clock, e.g. with a fixed instant in tests.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    fn extend(&self, history: &mut Vec<Candle>, timeframe: Timeframe, until: DateTime<Utc>) {
        let step = timeframe.duration();
        let Some(mut last) = history.last().copied() else {
            return;
        };
        let mut rng = StdRng::seed_from_u64(self.seed ^ last.open_time.timestamp() as u64);
        while last.open_time + step <= until {
            last = next_candle(&mut rng, last.open_time + step, last.close, &self.params);
            history.push(last);
        }
    }
}

impl CandleSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<CandleSeries, SourceError> {
        let until = last_closed_open(timeframe, (self.clock)());
        let mut all = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let history = all.entry((symbol.to_string(), timeframe)).or_insert_with(|| {
            random_walk(self.seed, timeframe, until, lookback, &self.params)
        });
        self.extend(history, timeframe, until);
        let start = history.len().saturating_sub(lookback);
        Ok(CandleSeries::new(symbol, timeframe, history[start..].to_vec()))
    }
}
