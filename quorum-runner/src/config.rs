//! Trading-loop configuration: the symbol and cadence around one engine config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use quorum_core::config::{ConfigError, EngineConfig};

/// Everything needed to run the loop for one symbol.
///
/// ```toml
/// symbol = "BTCUSDT"
/// check_interval_secs = 60
/// lookback = 300
/// journal_path = "journal/btcusdt.jsonl"
///
/// [engine.mtf]
/// primary = "1h"
/// confirmations = ["15m", "1h", "4h"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraderConfig {
    pub symbol: String,
    pub check_interval_secs: u64,
    /// Candles requested per timeframe each cycle.
    pub lookback: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_path: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".into(),
            check_interval_secs: 60,
            lookback: 300,
            journal_path: None,
            engine: EngineConfig::default(),
        }
    }
}

impl TraderConfig {
    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Candles each timeframe needs before every indicator and the volatility
    /// regime are defined.
    pub fn min_lookback(&self) -> usize {
        let ind = &self.engine.indicators;
        (ind.max_lookback() + 1).max(ind.atr_period + self.engine.mtf.volatility_lookback)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "symbol",
                reason: "must not be empty".into(),
            });
        }
        if self.check_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "check_interval_secs",
                reason: "must be > 0".into(),
            });
        }
        let needed = self.min_lookback();
        if self.lookback < needed {
            return Err(ConfigError::Invalid {
                field: "lookback",
                reason: format!("{} is below the {needed} candles indicators need", self.lookback),
            });
        }
        self.engine.validate()
    }
}
