//! Engine configuration: every period, threshold, weight, risk fraction and
//! feature toggle the decision core recognizes.
//!
//! Built once at startup, validated, and passed by reference into every
//! component call. Nothing in the core reads ambient or global configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::domain::Timeframe;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("parse config TOML: {0}")]
    Parse(String),

    #[error("read config file: {0}")]
    Io(String),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Indicator Engine periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndicatorParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub atr_period: usize,
    pub volume_ma_period: usize,
    /// EMA period applied to OBV for its trend line; 1 uses raw OBV.
    pub obv_smoothing: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_fast: 9,
            ema_slow: 21,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            atr_period: 14,
            volume_ma_period: 20,
            obv_smoothing: 10,
        }
    }
}

impl IndicatorParams {
    /// Candles needed before every indicator in the frame is defined.
    pub fn max_lookback(&self) -> usize {
        [
            self.ema_slow,
            self.rsi_period + 1,
            self.macd_slow + self.macd_signal - 1,
            self.atr_period + 1,
            self.volume_ma_period,
            self.obv_smoothing,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Pattern Recognizer thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatternConfig {
    /// Added to a pattern's base strength when it follows a qualifying run.
    pub trend_context_bonus: f64,
    /// Length of the prior run that counts as trend context.
    pub trend_context_run: usize,
    pub max_strength: f64,
    /// Minimum candles before complex (extrema-based) detection runs.
    pub min_window: usize,
    /// Trailing candles scanned by the complex detector.
    pub complex_lookback: usize,
    /// Minimum distance, in candles, between two extrema of the same polarity.
    pub extrema_spacing: usize,
    pub shoulder_diff_threshold: f64,
    pub level_diff_threshold: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            trend_context_bonus: 0.2,
            trend_context_run: 3,
            max_strength: 1.0,
            min_window: 14,
            complex_lookback: 120,
            extrema_spacing: 3,
            shoulder_diff_threshold: 0.10,
            level_diff_threshold: 0.03,
        }
    }
}

/// Multi-timeframe aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MtfConfig {
    /// Timeframe whose candles drive the entry trigger.
    pub primary: Timeframe,
    /// Timeframes that vote on the primary candidate (may include the primary).
    pub confirmations: Vec<Timeframe>,
    pub alignment_required: usize,
    pub weight_lower: f64,
    pub weight_main: f64,
    pub weight_higher: f64,
    pub volatility_adjustment: bool,
    /// SMA window of ATR used as the volatility baseline.
    pub volatility_lookback: usize,
    pub volatility_sensitivity: f64,
    /// Upper bound on the log-weight tilt applied in high volatility.
    pub max_tilt: f64,
    /// |direction_score| at or below this is neutral.
    pub neutral_band: f64,
}

impl Default for MtfConfig {
    fn default() -> Self {
        Self {
            primary: Timeframe::H1,
            confirmations: vec![Timeframe::M15, Timeframe::H1, Timeframe::H4],
            alignment_required: 2,
            weight_lower: 0.7,
            weight_main: 1.0,
            weight_higher: 1.2,
            volatility_adjustment: true,
            volatility_lookback: 20,
            volatility_sensitivity: 1.0,
            max_tilt: 0.5,
            neutral_band: 0.1,
        }
    }
}

impl MtfConfig {
    /// Static base weight of a timeframe relative to the primary.
    pub fn base_weight(&self, tf: Timeframe) -> f64 {
        match tf.cmp(&self.primary) {
            std::cmp::Ordering::Less => self.weight_lower,
            std::cmp::Ordering::Equal => self.weight_main,
            std::cmp::Ordering::Greater => self.weight_higher,
        }
    }

    /// Primary first, then confirmations, without duplicates.
    pub fn required_timeframes(&self) -> Vec<Timeframe> {
        let mut tfs = vec![self.primary];
        for tf in &self.confirmations {
            if !tfs.contains(tf) {
                tfs.push(*tf);
            }
        }
        tfs
    }
}

/// Signal Decision Engine thresholds and confirmation toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecisionConfig {
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub volume_confirmation: bool,
    /// Volume must exceed this multiple of its moving average.
    pub volume_threshold: f64,
    pub pattern_confirmation: bool,
    pub min_pattern_strength: f64,
    /// A pattern counts if it completed within this many most recent candles.
    pub pattern_recency: usize,
    pub mtf_confirmation: bool,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            volume_confirmation: true,
            volume_threshold: 1.5,
            pattern_confirmation: true,
            min_pattern_strength: 0.5,
            pattern_recency: 3,
            mtf_confirmation: true,
        }
    }
}

/// Risk budget and bracket geometry. Invariant for the engine's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskConfig {
    /// Fraction of balance risked per trade (0.01 = 1%).
    pub risk_per_trade: f64,
    pub risk_reward_ratio: f64,
    pub atr_sl_multiplier: f64,
    /// Stop distance as a fraction of entry price when ATR is undefined or zero.
    pub fallback_stop_pct: f64,
    /// Affects margin only, never risk amount or size.
    pub leverage: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.01,
            risk_reward_ratio: 2.0,
            atr_sl_multiplier: 1.5,
            fallback_stop_pct: 0.005,
            leverage: 5.0,
        }
    }
}

/// Complete decision-core configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub indicators: IndicatorParams,
    pub patterns: PatternConfig,
    pub mtf: MtfConfig,
    pub decision: DecisionConfig,
    pub risk: RiskConfig,
}

impl EngineConfig {
    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Deterministic BLAKE3 fingerprint of the canonical JSON form.
    pub fn config_hash(&self) -> String {
        // Struct fields serialize in declaration order, so the JSON is canonical.
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    /// Reject invalid or contradictory settings. Fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ind = &self.indicators;
        for (field, value) in [
            ("indicators.ema_fast", ind.ema_fast),
            ("indicators.ema_slow", ind.ema_slow),
            ("indicators.rsi_period", ind.rsi_period),
            ("indicators.macd_fast", ind.macd_fast),
            ("indicators.macd_slow", ind.macd_slow),
            ("indicators.macd_signal", ind.macd_signal),
            ("indicators.atr_period", ind.atr_period),
            ("indicators.volume_ma_period", ind.volume_ma_period),
            ("indicators.obv_smoothing", ind.obv_smoothing),
        ] {
            if value == 0 {
                return Err(invalid(field, "period must be >= 1"));
            }
        }
        if ind.ema_fast >= ind.ema_slow {
            return Err(invalid("indicators.ema_fast", "must be < ema_slow"));
        }
        if ind.macd_fast >= ind.macd_slow {
            return Err(invalid("indicators.macd_fast", "must be < macd_slow"));
        }

        let pat = &self.patterns;
        if !(pat.trend_context_bonus >= 0.0 && pat.trend_context_bonus.is_finite()) {
            return Err(invalid("patterns.trend_context_bonus", "must be finite and >= 0"));
        }
        if !(pat.max_strength > 0.0 && pat.max_strength.is_finite()) {
            return Err(invalid("patterns.max_strength", "must be finite and > 0"));
        }
        if pat.min_window < 14 {
            return Err(invalid("patterns.min_window", "must be >= 14"));
        }
        if pat.complex_lookback < pat.min_window {
            return Err(invalid("patterns.complex_lookback", "must be >= min_window"));
        }
        if pat.extrema_spacing == 0 {
            return Err(invalid("patterns.extrema_spacing", "must be >= 1"));
        }
        for (field, value) in [
            ("patterns.shoulder_diff_threshold", pat.shoulder_diff_threshold),
            ("patterns.level_diff_threshold", pat.level_diff_threshold),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(invalid(field, "must be in (0, 1)"));
            }
        }

        let mtf = &self.mtf;
        if mtf.confirmations.is_empty() {
            return Err(invalid("mtf.confirmations", "at least one timeframe required"));
        }
        if mtf.alignment_required == 0 {
            return Err(invalid("mtf.alignment_required", "must be >= 1"));
        }
        for (field, w) in [
            ("mtf.weight_lower", mtf.weight_lower),
            ("mtf.weight_main", mtf.weight_main),
            ("mtf.weight_higher", mtf.weight_higher),
        ] {
            if !(w > 0.0 && w.is_finite()) {
                return Err(invalid(field, "weight must be finite and > 0"));
            }
        }
        if mtf.weight_lower > mtf.weight_main || mtf.weight_main > mtf.weight_higher {
            return Err(invalid(
                "mtf.weight_*",
                "weights must not decrease from lower to higher timeframes",
            ));
        }
        if mtf.volatility_lookback == 0 {
            return Err(invalid("mtf.volatility_lookback", "must be >= 1"));
        }
        if !(mtf.volatility_sensitivity >= 0.0 && mtf.volatility_sensitivity.is_finite()) {
            return Err(invalid("mtf.volatility_sensitivity", "must be finite and >= 0"));
        }
        if !(mtf.max_tilt >= 0.0 && mtf.max_tilt.is_finite()) {
            return Err(invalid("mtf.max_tilt", "must be finite and >= 0"));
        }
        if !(0.0..1.0).contains(&mtf.neutral_band) {
            return Err(invalid("mtf.neutral_band", "must be in [0, 1)"));
        }

        let dec = &self.decision;
        if !(dec.rsi_oversold > 0.0
            && dec.rsi_oversold < dec.rsi_overbought
            && dec.rsi_overbought < 100.0)
        {
            return Err(invalid(
                "decision.rsi_*",
                "require 0 < rsi_oversold < rsi_overbought < 100",
            ));
        }
        if !(dec.volume_threshold > 0.0 && dec.volume_threshold.is_finite()) {
            return Err(invalid("decision.volume_threshold", "must be finite and > 0"));
        }
        if !(dec.min_pattern_strength >= 0.0 && dec.min_pattern_strength.is_finite()) {
            return Err(invalid("decision.min_pattern_strength", "must be finite and >= 0"));
        }
        if dec.pattern_recency == 0 {
            return Err(invalid("decision.pattern_recency", "must be >= 1"));
        }

        let risk = &self.risk;
        if !(risk.risk_per_trade > 0.0 && risk.risk_per_trade < 1.0) {
            return Err(invalid("risk.risk_per_trade", "must be in (0, 1)"));
        }
        for (field, value) in [
            ("risk.risk_reward_ratio", risk.risk_reward_ratio),
            ("risk.atr_sl_multiplier", risk.atr_sl_multiplier),
            ("risk.fallback_stop_pct", risk.fallback_stop_pct),
            ("risk.leverage", risk.leverage),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(invalid(field, "must be finite and > 0"));
            }
        }
        if risk.fallback_stop_pct >= 1.0 {
            return Err(invalid("risk.fallback_stop_pct", "must be < 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_equals_default() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let config = EngineConfig::from_toml(
            r#"
[indicators]
ema_fast = 5
ema_slow = 13

[mtf]
primary = "4h"
confirmations = ["1h", "4h", "1d"]
alignment_required = 3

[risk]
risk_per_trade = 0.02
"#,
        )
        .unwrap();
        assert_eq!(config.indicators.ema_fast, 5);
        assert_eq!(config.indicators.rsi_period, 14);
        assert_eq!(config.mtf.primary, Timeframe::H4);
        assert_eq!(config.mtf.confirmations.len(), 3);
        assert_eq!(config.risk.risk_per_trade, 0.02);
        assert_eq!(config.risk.risk_reward_ratio, 2.0);
    }

    #[test]
    fn unknown_option_rejected() {
        let err = EngineConfig::from_toml("[decision]\nvolume_thresh = 2.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_period_rejected() {
        let mut config = EngineConfig::default();
        config.indicators.rsi_period = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "indicators.rsi_period", .. })
        ));
    }

    #[test]
    fn contradictory_ema_periods_rejected() {
        let mut config = EngineConfig::default();
        config.indicators.ema_fast = 21;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_rsi_thresholds_rejected() {
        let mut config = EngineConfig::default();
        config.decision.rsi_oversold = 80.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn decreasing_weights_rejected() {
        let mut config = EngineConfig::default();
        config.mtf.weight_higher = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn risk_fraction_bounds() {
        let mut config = EngineConfig::default();
        config.risk.risk_per_trade = 1.5;
        assert!(config.validate().is_err());
        config.risk.risk_per_trade = -0.01;
        assert!(config.validate().is_err());
    }

    #[test]
    fn small_pattern_window_rejected() {
        let mut config = EngineConfig::default();
        config.patterns.min_window = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_hash_is_deterministic_and_param_sensitive() {
        let a = EngineConfig::default();
        let mut b = EngineConfig::default();
        assert_eq!(a.config_hash(), b.config_hash());
        b.risk.risk_reward_ratio = 3.0;
        assert_ne!(a.config_hash(), b.config_hash());
    }

    #[test]
    fn base_weight_by_rank() {
        let mtf = MtfConfig::default();
        assert_eq!(mtf.base_weight(Timeframe::M15), 0.7);
        assert_eq!(mtf.base_weight(Timeframe::H1), 1.0);
        assert_eq!(mtf.base_weight(Timeframe::H4), 1.2);
    }

    #[test]
    fn required_timeframes_dedups_primary() {
        let mtf = MtfConfig::default();
        assert_eq!(
            mtf.required_timeframes(),
            vec![Timeframe::H1, Timeframe::M15, Timeframe::H4]
        );
    }

    #[test]
    fn max_lookback_covers_macd_signal() {
        let p = IndicatorParams::default();
        assert_eq!(p.max_lookback(), 26 + 9 - 1);
    }
}
