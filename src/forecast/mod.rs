//! Training, persistence and inference on top of the feature table.

pub mod error;
pub mod forecaster;
pub mod model;
pub mod repository;
pub mod trainer;

pub use forecaster::{clamp_prediction, Forecaster};
pub use model::ForecastModel;
pub use repository::ModelRepository;
pub use trainer::{Evaluation, ForecastTrainer, TrainingOutcome, TrainingReport, ValidationMetrics};
