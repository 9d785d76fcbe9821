//! Minimum-spacing peak/trough finder over candle highs and lows.

use crate::domain::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremumKind {
    Peak,
    Trough,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremum {
    pub index: usize,
    pub price: f64,
    pub kind: ExtremumKind,
}

/// Local extrema, alternating peak/trough, in index order.
///
/// A candle is a peak if its high is the maximum of the `spacing` candles on
/// each side (the first of a plateau wins); troughs mirror this on lows. An
/// outside candle that qualifies as both is dropped. Runs of the same kind
/// collapse to their most extreme member.
pub fn find_extrema(candles: &[Candle], spacing: usize) -> Vec<Extremum> {
    let n = candles.len();
    let spacing = spacing.max(1);
    if n < 2 * spacing + 1 {
        return Vec::new();
    }

    let mut raw = Vec::new();
    for i in spacing..n - spacing {
        let left = &candles[i - spacing..i];
        let right = &candles[i + 1..=i + spacing];
        let high = candles[i].high;
        let low = candles[i].low;

        let is_peak = left.iter().all(|c| c.high < high) && right.iter().all(|c| c.high <= high);
        let is_trough = left.iter().all(|c| c.low > low) && right.iter().all(|c| c.low >= low);

        match (is_peak, is_trough) {
            (true, false) => raw.push(Extremum {
                index: i,
                price: high,
                kind: ExtremumKind::Peak,
            }),
            (false, true) => raw.push(Extremum {
                index: i,
                price: low,
                kind: ExtremumKind::Trough,
            }),
            _ => {}
        }
    }

    let mut out: Vec<Extremum> = Vec::with_capacity(raw.len());
    for e in raw {
        match out.last_mut() {
            Some(last) if last.kind == e.kind => {
                let more_extreme = match e.kind {
                    ExtremumKind::Peak => e.price > last.price,
                    ExtremumKind::Trough => e.price < last.price,
                };
                if more_extreme {
                    *last = e;
                }
            }
            _ => out.push(e),
        }
    }
    out
}
