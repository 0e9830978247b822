use crate::position_sizing::PositionSizing;
use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "config/bot.config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataMode {
    #[default]
    Sample,
    Exchange,
}

/// Bars per year for a nominal timeframe label; unknown labels count as daily.
pub fn timeframe_periods_per_year(timeframe: &str) -> u32 {
    match timeframe {
        "1m" => 525_600,
        "5m" => 105_120,
        "15m" => 35_040,
        "30m" => 17_520,
        "1h" => 8_760,
        "4h" => 2_190,
        "1d" => 365,
        _ => 365,
    }
}

/// Run configuration. Layered as defaults, config file, environment, then CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub mode: String,
    pub symbol: String,
    pub timeframe: String,
    pub initial_balance: f64,
    pub fee_rate: f64,
    pub predict_horizon: usize,
    #[serde(alias = "model_type")]
    pub signal_source: String,
    pub signal_params: HashMap<String, f64>,
    pub position_sizing: PositionSizing,
    pub data_mode: DataMode,
    pub data_path: Option<PathBuf>,
    pub exchange_name: String,
    pub limit: usize,
    pub report_dir: PathBuf,
    pub save_model: bool,
    pub load_model: bool,
    pub model_path: PathBuf,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            mode: "backtest".to_string(),
            symbol: "BTC/USDT".to_string(),
            timeframe: "1h".to_string(),
            initial_balance: 10_000.0,
            fee_rate: 0.001,
            predict_horizon: 1,
            signal_source: "random_forest".to_string(),
            signal_params: HashMap::new(),
            position_sizing: PositionSizing::FullBalance,
            data_mode: DataMode::Sample,
            data_path: None,
            exchange_name: "binance".to_string(),
            limit: 1000,
            report_dir: PathBuf::from("reports"),
            save_model: false,
            load_model: false,
            model_path: PathBuf::from("reports/model.json"),
        }
    }
}

impl BotConfig {
    /// Reads a JSON config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Uses the explicit path when given, otherwise the default file if it exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match explicit_path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn apply_env_overrides(&mut self, env: &HashMap<String, String>) {
        let lookup = |key: &str| {
            env.get(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        if let Some(symbol) = lookup("DEFAULT_SYMBOL") {
            self.symbol = symbol;
        }
        if let Some(timeframe) = lookup("TIMEFRAME") {
            self.timeframe = timeframe;
        }
        if let Some(report_dir) = lookup("REPORT_DIR") {
            self.report_dir = PathBuf::from(report_dir);
        }
        if let Some(model_path) = lookup("MODEL_PATH") {
            self.model_path = PathBuf::from(model_path);
        }
    }

    pub fn periods_per_year(&self) -> u32 {
        timeframe_periods_per_year(&self.timeframe)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fee_rate.is_finite() || self.fee_rate < 0.0 || self.fee_rate >= 1.0 {
            return Err(anyhow!(
                "fee_rate must be >= 0 and < 1 (value: {})",
                self.fee_rate
            ));
        }
        if !self.initial_balance.is_finite() || self.initial_balance <= 0.0 {
            return Err(anyhow!(
                "initial_balance must be a positive number (value: {})",
                self.initial_balance
            ));
        }
        if self.predict_horizon < 1 {
            return Err(anyhow!(
                "predict_horizon must be >= 1 (value: {})",
                self.predict_horizon
            ));
        }
        if self.limit < 1 {
            return Err(anyhow!("limit must be >= 1 (value: {})", self.limit));
        }
        if self.symbol.trim().is_empty() {
            return Err(anyhow!("symbol must not be empty"));
        }
        match self.position_sizing {
            PositionSizing::FixedFraction(fraction)
                if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 =>
            {
                Err(anyhow!(
                    "position_sizing fixed_fraction must be in (0, 1] (value: {})",
                    fraction
                ))
            }
            PositionSizing::FixedUnits(units) if !units.is_finite() || units <= 0.0 => Err(
                anyhow!("position_sizing fixed_units must be positive (value: {})", units),
            ),
            _ => Ok(()),
        }
    }
}
