use std::path::PathBuf;
use thiserror::Error;

/// No or insufficient measurements for the requested operation.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Series for station '{0}' is empty")]
    EmptySeries(String),

    #[error("No rows with complete features and a defined target are available for training")]
    NoTrainingRows,

    #[error("No rows with complete features and a defined target are available for evaluation")]
    NoEvaluationRows,
}

/// Missing, incompatible or unusable model artifacts.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("No model is loaded; train or load one first")]
    NotLoaded,

    #[error("Model artifact not found: '{0}'")]
    ArtifactMissing(PathBuf),

    #[error("Failed to read model artifact '{0}'")]
    ArtifactRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to write model artifact '{0}'")]
    ArtifactWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to decode model '{0}'")]
    ModelDecode(PathBuf, #[source] Box<bincode::error::DecodeError>),

    #[error("Failed to encode model")]
    ModelEncode(#[source] Box<bincode::error::EncodeError>),

    #[error("Failed to decode feature columns '{0}'")]
    FeatureColumnsDecode(PathBuf, #[source] serde_json::Error),

    #[error("Failed to encode feature columns")]
    FeatureColumnsEncode(#[source] serde_json::Error),

    #[error("Feature columns {found:?} do not match the columns the estimator was fitted with {expected:?}")]
    FeatureColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Estimator expects {estimator} features but {columns} feature columns were given")]
    FeatureCountMismatch { estimator: usize, columns: usize },

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Training rows have inconsistent widths: expected {expected}, got {got}")]
    RaggedTrainingSet { expected: usize, got: usize },

    #[error("Got {features} feature rows but {targets} targets")]
    TargetLengthMismatch { features: usize, targets: usize },
}
