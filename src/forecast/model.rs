use crate::forecast::error::ModelError;
use crate::ml::forest::RandomForest;
use crate::ml::regressor::Regressor;
use serde::{Deserialize, Serialize};

/// A fitted estimator together with the ordered feature columns it was fitted on.
///
/// The two never travel separately: a vector is only ever fed to the estimator in
/// exactly this column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastModel<R = RandomForest> {
    estimator: R,
    feature_columns: Vec<String>,
}

impl<R: Regressor> ForecastModel<R> {
    pub fn new(estimator: R, feature_columns: Vec<String>) -> Result<Self, ModelError> {
        if estimator.n_features() != feature_columns.len() {
            return Err(ModelError::FeatureCountMismatch {
                estimator: estimator.n_features(),
                columns: feature_columns.len(),
            });
        }
        Ok(Self {
            estimator,
            feature_columns,
        })
    }

    pub fn estimator(&self) -> &R {
        &self.estimator
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    /// Raw (unclamped) prediction for a vector in [`Self::feature_columns`] order.
    pub fn predict_vector(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.estimator.n_features() {
            return Err(ModelError::FeatureCountMismatch {
                estimator: self.estimator.n_features(),
                columns: features.len(),
            });
        }
        Ok(self.estimator.predict_row(features))
    }

    pub fn into_parts(self) -> (R, Vec<String>) {
        (self.estimator, self.feature_columns)
    }
}
