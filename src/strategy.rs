use crate::error::{BacktestError, BacktestResult};
use crate::features::FeatureRow;
use crate::models::Signal;
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;

pub const MIN_TRAINING_ROWS: usize = 20;
/// The validation tail is one fifth of the rows.
pub const VALIDATION_PARTS: usize = 5;

/// Produces the per-bar long/flat signal fed into the simulator.
pub trait SignalSource {
    fn name(&self) -> &str;
    /// Fits on the chronological training split and returns validation accuracy.
    fn train(&mut self, features: &[FeatureRow], labels: &[bool]) -> BacktestResult<f64>;
    fn predict(&self, features: &[FeatureRow]) -> Vec<Signal>;
    fn snapshot_state(&self) -> Option<Value> {
        None
    }
    fn restore_state(&mut self, _state: &Value) -> Result<()> {
        Ok(())
    }
}

/// Index where the validation tail starts; the tail is the last 20% (rounded up).
pub fn validation_split_index(rows: usize) -> BacktestResult<usize> {
    if rows < MIN_TRAINING_ROWS {
        return Err(BacktestError::InsufficientData {
            required: MIN_TRAINING_ROWS,
            available: rows,
        });
    }
    let validation_rows = rows.div_ceil(VALIDATION_PARTS);
    Ok(rows - validation_rows)
}

pub fn accuracy(predictions: &[Signal], labels: &[bool]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(labels)
        .filter(|(prediction, &label)| (**prediction == Signal::Long) == label)
        .count();
    correct as f64 / labels.len() as f64
}

/// Scores a source on the validation tail as it stands, without fitting it.
pub fn validate_rule<S: SignalSource + ?Sized>(
    source: &S,
    features: &[FeatureRow],
    labels: &[bool],
) -> BacktestResult<f64> {
    let split = validation_split_index(features.len())?;
    let predictions = source.predict(&features[split..]);
    Ok(accuracy(&predictions, &labels[split..]))
}

#[path = "strategies/random_forest.rs"]
pub mod random_forest;

pub use random_forest::RandomForestSignal;

#[path = "strategies/logistic.rs"]
pub mod logistic;

pub use logistic::LogisticSignal;

#[path = "strategies/trend.rs"]
pub mod trend;

pub use trend::TrendSignal;

#[path = "strategies/buy_and_hold.rs"]
pub mod buy_and_hold;

pub use buy_and_hold::BuyAndHoldSignal;

pub fn create_signal_source(
    name: &str,
    parameters: &HashMap<String, f64>,
) -> Result<Box<dyn SignalSource + Send + Sync>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "random_forest" => Ok(Box::new(RandomForestSignal::new(parameters))),
        "logistic" => Ok(Box::new(LogisticSignal::new(parameters))),
        "trend" => Ok(Box::new(TrendSignal::new())),
        "buy_and_hold" => Ok(Box::new(BuyAndHoldSignal::new())),
        other => Err(anyhow::anyhow!("Unknown signal source: {}", other)),
    }
}
