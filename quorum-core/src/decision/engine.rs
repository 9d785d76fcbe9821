use tracing::{debug, warn};

use super::filters::{self, FilterContext};
use super::{DecisionInput, EvaluationError};
use crate::config::EngineConfig;
use crate::domain::{
    Direction, ExitReason, Factor, FactorOutcome, PositionStatus, SignalDecision, SignalType,
    TradeSide,
};
use crate::mtf::MtfAggregate;

/// Outcome of checking one entry direction.
struct EntryCheck {
    factors: Vec<Factor>,
    triggered: bool,
    qualifies: bool,
    confidence: f64,
}

fn mtf_factor(mtf: Option<&MtfAggregate>, dir: Direction, config: &EngineConfig) -> Factor {
    if !config.decision.mtf_confirmation {
        return Factor::new(filters::MTF_ALIGNMENT, FactorOutcome::Disabled);
    }
    match mtf.filter(|a| a.is_available()) {
        None => Factor::new(filters::MTF_ALIGNMENT, FactorOutcome::Unavailable),
        Some(agg) => {
            let alignment = agg.alignment(dir);
            Factor::new(filters::MTF_ALIGNMENT, FactorOutcome::from_bool(alignment.holds()))
                .with_value(alignment.agreeing as f64)
        }
    }
}

fn outcome_score(outcome: FactorOutcome) -> f64 {
    match outcome {
        FactorOutcome::Passed => 1.0,
        FactorOutcome::Disabled | FactorOutcome::Unavailable => 0.5,
        FactorOutcome::Failed => 0.0,
    }
}

/// Mean filter score, blended with the weighted MTF score when one exists.
fn confidence(confirmations: &[Factor], mtf: Option<&MtfAggregate>, dir: Direction) -> f64 {
    let filter_score = if confirmations.is_empty() {
        1.0
    } else {
        confirmations
            .iter()
            .map(|f| outcome_score(f.outcome))
            .sum::<f64>()
            / confirmations.len() as f64
    };
    match mtf.filter(|a| a.is_available()) {
        Some(agg) => {
            let mtf_score = (agg.weighted_score * dir.sign()).clamp(0.0, 1.0);
            (0.5 * filter_score + 0.5 * mtf_score).min(1.0)
        }
        None => filter_score.min(1.0),
    }
}

fn entry_check(
    ctx: &FilterContext<'_>,
    mtf: Option<&MtfAggregate>,
    dir: Direction,
    config: &EngineConfig,
) -> EntryCheck {
    let trigger = filters::ema_cross(ctx, dir);
    let confirmations = vec![
        filters::rsi(ctx, dir),
        filters::macd(ctx, dir),
        filters::volume(ctx, dir),
        filters::pattern(ctx, dir),
        mtf_factor(mtf, dir, config),
    ];
    let triggered = trigger.outcome.is_passed();
    let qualifies = triggered && confirmations.iter().all(|f| f.outcome.is_satisfied());
    let confidence = confidence(&confirmations, mtf, dir);

    let mut factors = Vec::with_capacity(confirmations.len() + 1);
    factors.push(trigger);
    factors.extend(confirmations);
    EntryCheck {
        factors,
        triggered,
        qualifies,
        confidence,
    }
}

fn decision(input: &DecisionInput<'_>, signal: SignalType, check: EntryCheck) -> SignalDecision {
    SignalDecision {
        signal,
        timestamp: input.timestamp,
        contributing_factors: check.factors,
        confidence: check.confidence,
        exit_reason: None,
        note: None,
    }
}

fn exit_reason_name(reason: ExitReason) -> &'static str {
    match reason {
        ExitReason::StopLoss => "stop_loss",
        ExitReason::TakeProfit => "take_profit",
        ExitReason::Reversal => "reversal",
    }
}

fn from_flat(
    input: &DecisionInput<'_>,
    ctx: &FilterContext<'_>,
    config: &EngineConfig,
) -> SignalDecision {
    let long = entry_check(ctx, input.mtf, Direction::Bullish, config);
    if long.qualifies {
        return decision(input, SignalType::Long, long);
    }
    let short = entry_check(ctx, input.mtf, Direction::Bearish, config);
    if short.qualifies {
        return decision(input, SignalType::Short, short);
    }

    // Report whichever side actually triggered; otherwise just the trigger.
    let factors = if long.triggered {
        long.factors
    } else if short.triggered {
        short.factors
    } else {
        long.factors.into_iter().take(1).collect()
    };
    SignalDecision::none(input.timestamp, factors)
}

fn from_open(
    input: &DecisionInput<'_>,
    ctx: &FilterContext<'_>,
    side: TradeSide,
    config: &EngineConfig,
) -> SignalDecision {
    let position = input.position;
    if let Some(reason) = input.candles.last().and_then(|c| position.protective_exit(c)) {
        let level = match reason {
            ExitReason::StopLoss => position.stop_loss,
            _ => position.take_profit,
        };
        let mut factor = Factor::new(exit_reason_name(reason), FactorOutcome::Passed);
        if let Some(level) = level {
            factor = factor.with_value(level);
        }
        return SignalDecision {
            signal: SignalType::Exit,
            timestamp: input.timestamp,
            contributing_factors: vec![factor],
            confidence: 1.0,
            exit_reason: Some(reason),
            note: None,
        };
    }

    let reversal = entry_check(ctx, input.mtf, side.direction().opposite(), config);
    if reversal.qualifies {
        let mut d = decision(input, SignalType::Exit, reversal);
        d.exit_reason = Some(ExitReason::Reversal);
        return d;
    }

    let mut factors = Vec::new();
    for (name, level) in [
        ("stop_loss", position.stop_loss),
        ("take_profit", position.take_profit),
    ] {
        match level {
            Some(l) => factors.push(Factor::new(name, FactorOutcome::Failed).with_value(l)),
            None => factors.push(Factor::new(name, FactorOutcome::Unavailable)),
        }
    }
    factors.extend(reversal.factors.into_iter().take(1));
    SignalDecision::none(input.timestamp, factors)
}

fn evaluate(input: &DecisionInput<'_>, config: &EngineConfig) -> Result<SignalDecision, EvaluationError> {
    let n = input.candles.len();
    if n == 0 {
        return Err(EvaluationError::EmptySeries);
    }
    if input.frame.len() != n {
        return Err(EvaluationError::FrameMisaligned {
            candles: n,
            frame: input.frame.len(),
        });
    }
    // Protective exits compare against the latest high/low, so it must be usable.
    if !input.candles[n - 1].is_sane() {
        return Err(EvaluationError::MalformedCandle { index: n - 1 });
    }

    let ctx = FilterContext::new(input.candles, input.frame, input.patterns, config);
    let decision = match input.position.status {
        PositionStatus::Flat => from_flat(input, &ctx, config),
        PositionStatus::Long => from_open(input, &ctx, TradeSide::Long, config),
        PositionStatus::Short => from_open(input, &ctx, TradeSide::Short, config),
    };
    Ok(decision)
}

/// Decide this cycle's signal. Never fails: any evaluation error becomes NONE.
pub fn decide(input: &DecisionInput<'_>, config: &EngineConfig) -> SignalDecision {
    match evaluate(input, config) {
        Ok(decision) => {
            debug!(
                signal = %decision.signal,
                confidence = decision.confidence,
                position = ?input.position.status,
                factors = ?decision.contributing_factors,
                "decision evaluated"
            );
            decision
        }
        Err(e) => {
            warn!(error = %e, "decision evaluation failed; holding");
            SignalDecision::fail_safe(input.timestamp, e.to_string())
        }
    }
}
