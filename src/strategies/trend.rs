use crate::error::BacktestResult;
use crate::features::{FeatureRow, MACD_INDEX, SMA_FAST_INDEX, SMA_SLOW_INDEX};
use crate::models::Signal;

/// Long while the fast SMA is above the slow SMA and MACD momentum is positive.
pub struct TrendSignal {
    name: String,
}

impl TrendSignal {
    pub fn new() -> Self {
        Self {
            name: "trend".to_string(),
        }
    }
}

impl Default for TrendSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl super::SignalSource for TrendSignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn train(&mut self, features: &[FeatureRow], labels: &[bool]) -> BacktestResult<f64> {
        super::validate_rule(self, features, labels)
    }

    fn predict(&self, features: &[FeatureRow]) -> Vec<Signal> {
        features
            .iter()
            .map(|row| Signal::from(row[SMA_FAST_INDEX] > row[SMA_SLOW_INDEX] && row[MACD_INDEX] > 0.0))
            .collect()
    }
}
