use crate::config::TrainerConfig;
use crate::forecast::error::ModelError;
use crate::ml::regressor::Regressor;
use crate::ml::tree::{RegressionTree, TreeParams};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// Tree `i` draws its bootstrap sample from `random_state + i`.
    pub random_state: u64,
    pub tree: TreeParams,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self::from(&TrainerConfig::default())
    }
}

impl From<&TrainerConfig> for ForestParams {
    fn from(config: &TrainerConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            random_state: config.random_state,
            tree: TreeParams {
                max_depth: config.max_depth,
                min_samples_split: config.min_samples_split,
                min_samples_leaf: config.min_samples_leaf,
            },
        }
    }
}

/// Bagged ensemble of regression trees; predictions are the mean over trees.
///
/// Trees are grown in parallel but each one only depends on its own seed, so a
/// fit is fully reproducible for a given `random_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &ForestParams) -> Result<Self, ModelError> {
        let n_features = x.first().map(Vec::len).ok_or(ModelError::EmptyTrainingSet)?;
        if x.len() != y.len() {
            return Err(ModelError::TargetLengthMismatch {
                features: x.len(),
                targets: y.len(),
            });
        }
        if let Some(row) = x.iter().find(|row| row.len() != n_features) {
            return Err(ModelError::RaggedTrainingSet {
                expected: n_features,
                got: row.len(),
            });
        }

        let n = x.len();
        let trees: Vec<RegressionTree> = (0..params.n_estimators.max(1))
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(params.random_state.wrapping_add(i as u64));
                let samples: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, &samples, &params.tree)
            })
            .collect();

        let feature_importances = average_importances(&trees, n_features);
        debug!(
            "Fitted random forest with {} trees on {} rows x {} features",
            trees.len(),
            n,
            n_features
        );
        Ok(Self {
            trees,
            n_features,
            feature_importances,
        })
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    /// Impurity-based importances, one per feature, summing to 1 unless no tree split.
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

/// Normalizes each tree's impurity decrease, averages over trees, then renormalizes.
fn average_importances(trees: &[RegressionTree], n_features: usize) -> Vec<f64> {
    let mut importances = vec![0.0; n_features];
    for tree in trees {
        let decrease = tree.impurity_decrease();
        let total: f64 = decrease.iter().sum();
        if total > 0.0 {
            for (importance, d) in importances.iter_mut().zip(decrease) {
                *importance += d / total;
            }
        }
    }
    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        importances.iter_mut().for_each(|i| *i /= total);
    }
    importances
}

impl Regressor for RandomForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|tree| tree.predict_row(row)).sum();
        sum / self.trees.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::metrics::r2;

    fn params(n_estimators: usize) -> ForestParams {
        ForestParams {
            n_estimators,
            ..ForestParams::default()
        }
    }

    fn trend() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..120)
            .map(|i| vec![(i % 24) as f64, ((i * 7) % 11) as f64])
            .collect();
        let y: Vec<f64> = x.iter().map(|row| 3.0 * row[0] + 1.0).collect();
        (x, y)
    }

    #[test]
    fn test_same_seed_gives_identical_forest() -> Result<(), Box<dyn std::error::Error>> {
        let (x, y) = trend();
        let a = RandomForest::fit(&x, &y, &params(16))?;
        let b = RandomForest::fit(&x, &y, &params(16))?;
        assert_eq!(a, b);

        let other_seed = RandomForest::fit(
            &x,
            &y,
            &ForestParams {
                random_state: 7,
                ..params(16)
            },
        )?;
        assert_ne!(a, other_seed);
        Ok(())
    }

    #[test]
    fn test_learns_signal_and_ranks_importances() -> Result<(), Box<dyn std::error::Error>> {
        let (x, y) = trend();
        let forest = RandomForest::fit(&x, &y, &params(25))?;

        assert_eq!(forest.n_estimators(), 25);
        assert_eq!(forest.n_features(), 2);
        assert!(r2(&y, &forest.predict(&x)) > 0.95);

        let importances = forest.feature_importances();
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
        Ok(())
    }

    #[test]
    fn test_constant_target_predicts_constant() -> Result<(), Box<dyn std::error::Error>> {
        let x: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, 1.0]).collect();
        let y = vec![10.0; 30];
        let forest = RandomForest::fit(&x, &y, &params(10))?;

        assert_eq!(forest.predict_row(&[100.0, -5.0]), 10.0);
        assert_eq!(forest.feature_importances(), &[0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_rejects_malformed_training_sets() {
        assert!(matches!(
            RandomForest::fit(&[], &[], &params(2)),
            Err(ModelError::EmptyTrainingSet)
        ));
        assert!(matches!(
            RandomForest::fit(&[vec![1.0], vec![2.0]], &[1.0], &params(2)),
            Err(ModelError::TargetLengthMismatch {
                features: 2,
                targets: 1
            })
        ));
        assert!(matches!(
            RandomForest::fit(&[vec![1.0, 2.0], vec![2.0]], &[1.0, 2.0], &params(2)),
            Err(ModelError::RaggedTrainingSet {
                expected: 2,
                got: 1
            })
        ));
    }
}
