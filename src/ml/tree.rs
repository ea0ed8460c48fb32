//! CART regression tree with variance-reduction splits.
//!
//! Nodes are stored in a flat vector; children are referenced by index so the tree
//! serializes as plain data.

use crate::ml::regressor::Regressor;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Splits that reduce the squared error by less than this are not taken.
const MIN_IMPURITY_DECREASE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct BestSplit {
    feature: usize,
    threshold: f64,
    /// Position in the sorted sample list where the right child starts.
    position: usize,
    child_sse: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    n_features: usize,
    /// Total squared-error decrease per feature, unnormalized.
    impurity_decrease: Vec<f64>,
}

impl RegressionTree {
    /// Fits a tree on the rows of `x` selected by `samples` (repeats allowed).
    ///
    /// `x` must be non-empty and rectangular and `samples` non-empty; the forest
    /// checks both before growing trees.
    pub fn fit(x: &[Vec<f64>], y: &[f64], samples: &[usize], params: &TreeParams) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let mut tree = Self {
            nodes: Vec::new(),
            n_features,
            impurity_decrease: vec![0.0; n_features],
        };
        let mut samples = samples.to_vec();
        tree.grow(x, y, &mut samples, 0, params);
        tree
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        self.depth_from(0)
    }

    pub(crate) fn impurity_decrease(&self) -> &[f64] {
        &self.impurity_decrease
    }

    fn depth_from(&self, index: usize) -> usize {
        match self.nodes.get(index) {
            Some(Node::Split { left, right, .. }) => {
                1 + self.depth_from(*left).max(self.depth_from(*right))
            }
            _ => 0,
        }
    }

    /// Appends the subtree for `samples` and returns its root index.
    fn grow(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        samples: &mut [usize],
        depth: usize,
        params: &TreeParams,
    ) -> usize {
        let (sum, sum_sq) = samples
            .iter()
            .fold((0.0, 0.0), |(s, sq), &i| (s + y[i], sq + y[i] * y[i]));
        let count = samples.len() as f64;
        let value = sum / count;
        let sse = sum_sq - sum * sum / count;

        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { value });

        let depth_exhausted = params.max_depth.is_some_and(|max| depth >= max);
        if depth_exhausted || samples.len() < params.min_samples_split || sse <= MIN_IMPURITY_DECREASE
        {
            return index;
        }

        let Some(split) = best_split(x, y, samples, params.min_samples_leaf) else {
            return index;
        };
        if sse - split.child_sse <= MIN_IMPURITY_DECREASE {
            return index;
        }

        sort_by_feature(x, samples, split.feature);
        let (left_samples, right_samples) = samples.split_at_mut(split.position);
        self.impurity_decrease[split.feature] += sse - split.child_sse;
        let left = self.grow(x, y, left_samples, depth + 1, params);
        let right = self.grow(x, y, right_samples, depth + 1, params);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }
}

fn sort_by_feature(x: &[Vec<f64>], samples: &mut [usize], feature: usize) {
    samples.sort_by(|&a, &b| {
        x[a][feature]
            .partial_cmp(&x[b][feature])
            .unwrap_or(Ordering::Equal)
    });
}

/// Lowest total child squared error over all features and thresholds that leave at
/// least `min_samples_leaf` samples on each side.
fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    samples: &mut [usize],
    min_samples_leaf: usize,
) -> Option<BestSplit> {
    let n = samples.len();
    let min_leaf = min_samples_leaf.max(1);
    if n < 2 * min_leaf {
        return None;
    }
    let n_features = x[samples[0]].len();
    let (total, total_sq) = samples
        .iter()
        .fold((0.0, 0.0), |(s, sq), &i| (s + y[i], sq + y[i] * y[i]));

    let mut best: Option<BestSplit> = None;
    for feature in 0..n_features {
        sort_by_feature(x, samples, feature);
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for position in 1..n {
            let previous = samples[position - 1];
            left_sum += y[previous];
            left_sq += y[previous] * y[previous];

            if position < min_leaf || n - position < min_leaf {
                continue;
            }
            let below = x[previous][feature];
            let above = x[samples[position]][feature];
            if below >= above {
                continue;
            }

            let left_n = position as f64;
            let right_n = (n - position) as f64;
            let right_sum = total - left_sum;
            let right_sq = total_sq - left_sq;
            let child_sse = (left_sq - left_sum * left_sum / left_n)
                + (right_sq - right_sum * right_sum / right_n);

            if best.map_or(true, |b| child_sse < b.child_sse) {
                best = Some(BestSplit {
                    feature,
                    threshold: below + (above - below) / 2.0,
                    position,
                    child_sse,
                });
            }
        }
    }
    best
}

impl Regressor for RegressionTree {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes.get(index) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    index = if value <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_fits_step_function_exactly() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| if i < 10 { 1.0 } else { 5.0 }).collect();

        let tree = RegressionTree::fit(&x, &y, &all(20), &TreeParams::default());

        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict_row(&[3.0]), 1.0);
        assert_eq!(tree.predict_row(&[9.4]), 1.0);
        assert_eq!(tree.predict_row(&[9.6]), 5.0);
        assert_eq!(tree.predict_row(&[100.0]), 5.0);
    }

    #[test]
    fn test_constant_target_is_single_leaf() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y = vec![4.0; 10];
        let tree = RegressionTree::fit(&x, &y, &all(10), &TreeParams::default());

        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict(&x), y);
        assert_eq!(tree.impurity_decrease(), &[0.0, 0.0]);
    }

    #[test]
    fn test_picks_informative_feature() {
        let x: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![((i * 17) % 40) as f64, (i % 2) as f64])
            .collect();
        let y: Vec<f64> = x.iter().map(|row| row[1] * 10.0).collect();

        let tree = RegressionTree::fit(&x, &y, &all(40), &TreeParams::default());

        assert_eq!(tree.predict_row(&[5.0, 1.0]), 10.0);
        assert_eq!(tree.predict_row(&[5.0, 0.0]), 0.0);
        assert_eq!(tree.impurity_decrease()[0], 0.0);
        assert!(tree.impurity_decrease()[1] > 0.0);
    }

    #[test]
    fn test_max_depth_and_min_leaf_limit_growth() {
        let x: Vec<Vec<f64>> = (0..64).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..64).map(|i| (i * i) as f64).collect();

        let shallow = RegressionTree::fit(
            &x,
            &y,
            &all(64),
            &TreeParams {
                max_depth: Some(3),
                ..TreeParams::default()
            },
        );
        assert!(shallow.depth() <= 3);

        let coarse = RegressionTree::fit(
            &x,
            &y,
            &all(64),
            &TreeParams {
                min_samples_leaf: 16,
                ..TreeParams::default()
            },
        );
        assert!(coarse.node_count() <= 7);
    }

    #[test]
    fn test_repeated_samples_weight_the_leaf_mean() {
        let x = vec![vec![0.0], vec![0.0]];
        let y = vec![1.0, 4.0];
        let tree = RegressionTree::fit(&x, &y, &[0, 1, 1], &TreeParams::default());
        assert_eq!(tree.predict_row(&[0.0]), 3.0);
    }
}
