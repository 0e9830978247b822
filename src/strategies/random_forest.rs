use crate::error::BacktestResult;
use crate::features::FeatureRow;
use crate::models::Signal;
use crate::param_utils::{get_param_f64_clamped, get_param_usize_at_least};
use anyhow::{anyhow, Context, Result};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

const FEATURE_COUNT: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TreeNode {
    Leaf {
        probability: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn probability(&self, row: &FeatureRow) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { probability } => return *probability,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                }
            }
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            TreeNode::Leaf { probability } => (0.0..=1.0).contains(probability),
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                *feature < FEATURE_COUNT
                    && threshold.is_finite()
                    && left.is_valid()
                    && right.is_valid()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ForestModel {
    trees: Vec<TreeNode>,
}

impl ForestModel {
    /// Mean of the per-tree up probabilities.
    fn probability(&self, row: &FeatureRow) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|tree| tree.probability(row)).sum::<f64>() / self.trees.len() as f64
    }
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Builds a single classification tree over a bootstrap sample.
struct TreeBuilder<'a> {
    features: &'a [FeatureRow],
    labels: &'a [bool],
    max_depth: usize,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: usize,
}

impl TreeBuilder<'_> {
    fn build(&self, rows: &[usize], depth: usize, rng: &mut StdRng) -> TreeNode {
        let total = rows.len();
        let positives = rows.iter().filter(|&&row| self.labels[row]).count();
        let leaf = TreeNode::Leaf {
            probability: if total == 0 {
                0.0
            } else {
                positives as f64 / total as f64
            },
        };

        if depth >= self.max_depth
            || total < self.min_samples_split
            || positives == 0
            || positives == total
        {
            return leaf;
        }

        let Some(split) = self.best_split(rows, positives, rng) else {
            return leaf;
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&row| self.features[row][split.feature] <= split.threshold);
        if left_rows.is_empty() || right_rows.is_empty() {
            return leaf;
        }

        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.build(&left_rows, depth + 1, rng)),
            right: Box::new(self.build(&right_rows, depth + 1, rng)),
        }
    }

    /// Scans sorted values of a random feature subset for the largest Gini decrease.
    fn best_split(
        &self,
        rows: &[usize],
        positives: usize,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let total = rows.len();
        let parent_impurity = gini(positives, total);

        let mut candidates: Vec<usize> = (0..FEATURE_COUNT).collect();
        candidates.shuffle(rng);
        candidates.truncate(self.max_features);

        let mut best: Option<SplitCandidate> = None;
        for &feature in &candidates {
            let mut sorted: Vec<(f64, bool)> = rows
                .iter()
                .map(|&row| (self.features[row][feature], self.labels[row]))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_positives = 0;
            for left_count in 1..total {
                if sorted[left_count - 1].1 {
                    left_positives += 1;
                }
                let (previous, next) = (sorted[left_count - 1].0, sorted[left_count].0);
                if previous == next {
                    continue;
                }
                let right_count = total - left_count;
                if left_count < self.min_samples_leaf || right_count < self.min_samples_leaf {
                    continue;
                }

                let weighted = (left_count as f64 * gini(left_positives, left_count)
                    + right_count as f64 * gini(positives - left_positives, right_count))
                    / total as f64;
                let gain = parent_impurity - weighted;
                if gain > best.as_ref().map_or(1e-12, |current| current.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (previous + next) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Bagged Gini trees with per-split feature subsampling, seeded for repeatable fits.
pub struct RandomForestSignal {
    name: String,
    trees: usize,
    max_depth: usize,
    min_samples_split: usize,
    min_samples_leaf: usize,
    threshold: f64,
    seed: u64,
    model: Option<ForestModel>,
}

impl RandomForestSignal {
    pub fn new(parameters: &HashMap<String, f64>) -> Self {
        Self {
            name: "random_forest".to_string(),
            trees: get_param_usize_at_least(parameters, "trees", 100, 1),
            max_depth: get_param_usize_at_least(parameters, "maxDepth", 10, 1),
            min_samples_split: get_param_usize_at_least(parameters, "minSamplesSplit", 2, 2),
            min_samples_leaf: get_param_usize_at_least(parameters, "minSamplesLeaf", 1, 1),
            threshold: get_param_f64_clamped(parameters, "threshold", 0.5, 0.0, 1.0),
            seed: get_param_usize_at_least(parameters, "seed", 42, 0) as u64,
            model: None,
        }
    }

    fn fit(&self, features: &[FeatureRow], labels: &[bool]) -> ForestModel {
        let builder = TreeBuilder {
            features,
            labels,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: (FEATURE_COUNT as f64).sqrt().ceil() as usize,
        };
        let mut rng = StdRng::seed_from_u64(self.seed);
        let rows = features.len();

        let trees = (0..self.trees)
            .map(|_| {
                let sample: Vec<usize> = (0..rows).map(|_| rng.gen_range(0..rows)).collect();
                builder.build(&sample, 0, &mut rng)
            })
            .collect();

        ForestModel { trees }
    }
}

impl super::SignalSource for RandomForestSignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn train(&mut self, features: &[FeatureRow], labels: &[bool]) -> BacktestResult<f64> {
        let split = super::validation_split_index(features.len())?;
        let model = self.fit(&features[..split], &labels[..split]);
        debug!(
            "Fitted random forest with {} trees on {} rows (seed {})",
            model.trees.len(),
            split,
            self.seed
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
            .map(|row| Signal::from(model.probability(row) > self.threshold))
            .collect()
    }

    fn snapshot_state(&self) -> Option<Value> {
        self.model
            .as_ref()
            .and_then(|model| serde_json::to_value(model).ok())
    }

    fn restore_state(&mut self, state: &Value) -> Result<()> {
        let model: ForestModel = serde_json::from_value(state.clone())
            .context("invalid random forest state")?;
        if model.trees.is_empty() || !model.trees.iter().all(TreeNode::is_valid) {
            return Err(anyhow!("random forest state has no usable trees"));
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
            let x = if up { 1.0 + idx as f64 * 0.01 } else { -1.0 - idx as f64 * 0.01 };
            features.push([x, 2.0 * x, 3.0 * x, 50.0 + x, x, 0.01 * x]);
            labels.push(up);
        }
        (features, labels)
    }

    fn small_forest() -> RandomForestSignal {
        let params: HashMap<String, f64> = [("trees".to_string(), 15.0)].into_iter().collect();
        RandomForestSignal::new(&params)
    }

    #[test]
    fn learns_a_separable_rule() {
        let (features, labels) = separable_rows(60);
        let mut source = small_forest();
        let accuracy = source.train(&features, &labels).unwrap();

        assert_eq!(accuracy, 1.0);
        assert_eq!(
            source.predict(&features[..4]),
            vec![Signal::Long, Signal::Flat, Signal::Long, Signal::Flat]
        );
    }

    #[test]
    fn untrained_forest_stays_flat() {
        let source = RandomForestSignal::new(&HashMap::new());
        assert_eq!(source.predict(&[[0.0; 6]; 2]), vec![Signal::Flat; 2]);
        assert!(source.snapshot_state().is_none());
    }

    #[test]
    fn same_seed_gives_same_forest() {
        let (features, labels) = separable_rows(50);
        let mut first = small_forest();
        let mut second = small_forest();
        first.train(&features, &labels).unwrap();
        second.train(&features, &labels).unwrap();
        assert_eq!(first.snapshot_state(), second.snapshot_state());
    }

    #[test]
    fn state_round_trips_and_rejects_bad_trees() {
        let (features, labels) = separable_rows(40);
        let mut trained = small_forest();
        trained.train(&features, &labels).unwrap();
        let state = trained.snapshot_state().expect("trained state");

        let mut restored = RandomForestSignal::new(&HashMap::new());
        restored.restore_state(&state).unwrap();
        assert_eq!(restored.predict(&features), trained.predict(&features));

        let empty = serde_json::json!({"trees": []});
        assert!(restored.restore_state(&empty).is_err());
        let bad_feature = serde_json::json!({"trees": [{
            "kind": "split",
            "feature": 9,
            "threshold": 0.0,
            "left": {"kind": "leaf", "probability": 1.0},
            "right": {"kind": "leaf", "probability": 0.0}
        }]});
        assert!(restored.restore_state(&bad_feature).is_err());
    }

    #[test]
    fn leaf_probability_is_share_of_up_labels() {
        let features = vec![[1.0; 6]; 4];
        let labels = vec![true, true, true, false];
        let builder = TreeBuilder {
            features: &features,
            labels: &labels,
            max_depth: 5,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 3,
        };
        let mut rng = StdRng::seed_from_u64(7);
        let tree = builder.build(&[0, 1, 2, 3], 0, &mut rng);
        assert_eq!(tree, TreeNode::Leaf { probability: 0.75 });
    }
}
