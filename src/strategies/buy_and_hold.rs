use crate::error::BacktestResult;
use crate::features::FeatureRow;
use crate::models::Signal;

pub struct BuyAndHoldSignal {
    name: String,
}

impl BuyAndHoldSignal {
    pub fn new() -> Self {
        Self {
            name: "buy_and_hold".to_string(),
        }
    }
}

impl Default for BuyAndHoldSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl super::SignalSource for BuyAndHoldSignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn train(&mut self, features: &[FeatureRow], labels: &[bool]) -> BacktestResult<f64> {
        super::validate_rule(self, features, labels)
    }

    fn predict(&self, features: &[FeatureRow]) -> Vec<Signal> {
        vec![Signal::Long; features.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::SignalSource;

    #[test]
    fn always_long_and_scores_share_of_up_moves() {
        let mut source = BuyAndHoldSignal::new();
        let features = vec![[0.0; 6]; 20];
        let mut labels = vec![true; 20];
        labels[18] = false;

        let accuracy = source.train(&features, &labels).unwrap();
        assert!((accuracy - 0.75).abs() < 1e-12);
        assert!(source.predict(&features).iter().all(|&s| s == Signal::Long));
    }
}
