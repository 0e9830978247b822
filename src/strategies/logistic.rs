use crate::error::BacktestResult;
use crate::features::FeatureRow;
use crate::models::Signal;
use crate::param_utils::{get_param_f64_clamped, get_param_usize_at_least};
use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

const FEATURE_COUNT: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LogisticModel {
    means: [f64; FEATURE_COUNT],
    scales: [f64; FEATURE_COUNT],
    weights: [f64; FEATURE_COUNT],
    bias: f64,
}

impl LogisticModel {
    fn standardize(&self, row: &FeatureRow) -> [f64; FEATURE_COUNT] {
        let mut scaled = [0.0; FEATURE_COUNT];
        for (idx, value) in row.iter().enumerate() {
            scaled[idx] = (value - self.means[idx]) / self.scales[idx];
        }
        scaled
    }

    fn probability(&self, row: &FeatureRow) -> f64 {
        let scaled = self.standardize(row);
        let logit = self.bias
            + scaled
                .iter()
                .zip(&self.weights)
                .map(|(x, w)| x * w)
                .sum::<f64>();
        sigmoid(logit)
    }
}

fn sigmoid(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

fn fit_scaling(features: &[FeatureRow]) -> ([f64; FEATURE_COUNT], [f64; FEATURE_COUNT]) {
    let mut means = [0.0; FEATURE_COUNT];
    let mut scales = [1.0; FEATURE_COUNT];
    if features.is_empty() {
        return (means, scales);
    }
    let count = features.len() as f64;

    for idx in 0..FEATURE_COUNT {
        let mean = features.iter().map(|row| row[idx]).sum::<f64>() / count;
        let variance = features
            .iter()
            .map(|row| (row[idx] - mean).powi(2))
            .sum::<f64>()
            / count;
        let std_dev = variance.sqrt();
        means[idx] = mean;
        scales[idx] = if std_dev > 0.0 && std_dev.is_finite() {
            std_dev
        } else {
            1.0
        };
    }

    (means, scales)
}

/// Logistic regression on standardised features, fitted with batch gradient descent.
pub struct LogisticSignal {
    name: String,
    learning_rate: f64,
    iterations: usize,
    l2_penalty: f64,
    threshold: f64,
    model: Option<LogisticModel>,
}

impl LogisticSignal {
    pub fn new(parameters: &HashMap<String, f64>) -> Self {
        Self {
            name: "logistic".to_string(),
            learning_rate: get_param_f64_clamped(parameters, "learningRate", 0.1, 1e-6, 10.0),
            iterations: get_param_usize_at_least(parameters, "iterations", 500, 1),
            l2_penalty: get_param_f64_clamped(parameters, "l2Penalty", 0.0, 0.0, 100.0),
            threshold: get_param_f64_clamped(parameters, "threshold", 0.5, 0.0, 1.0),
            model: None,
        }
    }

    fn fit(&self, features: &[FeatureRow], labels: &[bool]) -> LogisticModel {
        let (means, scales) = fit_scaling(features);
        let mut model = LogisticModel {
            means,
            scales,
            weights: [0.0; FEATURE_COUNT],
            bias: 0.0,
        };
        let scaled: Vec<[f64; FEATURE_COUNT]> =
            features.iter().map(|row| model.standardize(row)).collect();
        let count = features.len().max(1) as f64;

        for _ in 0..self.iterations {
            let mut weight_grad = [0.0; FEATURE_COUNT];
            let mut bias_grad = 0.0;
            for (row, &label) in scaled.iter().zip(labels) {
                let logit = model.bias
                    + row
                        .iter()
                        .zip(&model.weights)
                        .map(|(x, w)| x * w)
                        .sum::<f64>();
                let error = sigmoid(logit) - if label { 1.0 } else { 0.0 };
                for idx in 0..FEATURE_COUNT {
                    weight_grad[idx] += error * row[idx];
                }
                bias_grad += error;
            }
            for idx in 0..FEATURE_COUNT {
                let gradient = weight_grad[idx] / count + self.l2_penalty * model.weights[idx];
                model.weights[idx] -= self.learning_rate * gradient;
            }
            model.bias -= self.learning_rate * bias_grad / count;
        }

        model
    }
}

impl super::SignalSource for LogisticSignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn train(&mut self, features: &[FeatureRow], labels: &[bool]) -> BacktestResult<f64> {
        let split = super::validation_split_index(features.len())?;
        let model = self.fit(&features[..split], &labels[..split]);
        debug!(
            "Fitted logistic model on {} rows: weights {:?} bias {}",
            split, model.weights, model.bias
        );
        self.model = Some(model);

        let predictions = self.predict(&features[split..]);
        Ok(super::accuracy(&predictions, &labels[split..]))
    }

    fn predict(&self, features: &[FeatureRow]) -> Vec<Signal> {
        let Some(model) = self.model.as_ref() else {
            return vec![Signal::Flat; features.len()];
        };
        features
            .iter()
            .map(|row| Signal::from(model.probability(row) >= self.threshold))
            .collect()
    }

    fn snapshot_state(&self) -> Option<Value> {
        self.model
            .as_ref()
            .and_then(|model| serde_json::to_value(model).ok())
    }

    fn restore_state(&mut self, state: &Value) -> Result<()> {
        let model: LogisticModel = serde_json::from_value(state.clone())
            .context("invalid logistic model state")?;
        if model.scales.iter().any(|scale| *scale == 0.0 || !scale.is_finite()) {
            return Err(anyhow!("logistic model state has a non-positive feature scale"));
        }
        self.model = Some(model);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::SignalSource;

    fn separable_rows(count: usize) -> (Vec<FeatureRow>, Vec<bool>) {
        let mut features = Vec::with_capacity(count);
        let mut labels = Vec::with_capacity(count);
        for idx in 0..count {
            let up = idx % 2 == 0;
            let momentum = if up { 1.0 + idx as f64 * 0.01 } else { -1.0 - idx as f64 * 0.01 };
            features.push([100.0, 100.0, 100.0, 50.0, momentum, momentum * 0.01]);
            labels.push(up);
        }
        (features, labels)
    }

    #[test]
    fn learns_a_separable_rule() {
        let (features, labels) = separable_rows(60);
        let mut source = LogisticSignal::new(&HashMap::new());
        let accuracy = source.train(&features, &labels).unwrap();

        assert_eq!(accuracy, 1.0);
        let predictions = source.predict(&features[..4]);
        assert_eq!(
            predictions,
            vec![Signal::Long, Signal::Flat, Signal::Long, Signal::Flat]
        );
    }

    #[test]
    fn untrained_model_stays_flat() {
        let source = LogisticSignal::new(&HashMap::new());
        assert_eq!(source.predict(&[[0.0; 6]; 3]), vec![Signal::Flat; 3]);
        assert!(source.snapshot_state().is_none());
    }

    #[test]
    fn state_round_trips() {
        let (features, labels) = separable_rows(40);
        let mut trained = LogisticSignal::new(&HashMap::new());
        trained.train(&features, &labels).unwrap();
        let state = trained.snapshot_state().expect("trained state");

        let mut restored = LogisticSignal::new(&HashMap::new());
        restored.restore_state(&state).unwrap();
        assert_eq!(restored.predict(&features), trained.predict(&features));

        assert!(restored.restore_state(&serde_json::json!({"weights": []})).is_err());
    }

    #[test]
    fn training_is_deterministic() {
        let (features, labels) = separable_rows(50);
        let mut first = LogisticSignal::new(&HashMap::new());
        let mut second = LogisticSignal::new(&HashMap::new());
        assert_eq!(
            first.train(&features, &labels).unwrap(),
            second.train(&features, &labels).unwrap()
        );
        assert_eq!(first.snapshot_state(), second.snapshot_state());
    }
}
