//! Estimators: a CART regression tree, a bagged random forest built from it, and
//! the accuracy metrics used to report on them.

pub mod forest;
pub mod metrics;
pub mod regressor;
pub mod tree;

pub use forest::{ForestParams, RandomForest};
pub use regressor::Regressor;
pub use tree::{RegressionTree, TreeParams};
