use crate::config::{FeatureConfig, TrainerConfig};
use crate::error::Result;
use crate::features::builder::FeatureBuilder;
use crate::features::table::FeatureTable;
use crate::forecast::error::DataError;
use crate::forecast::model::ForecastModel;
use crate::ml::forest::{ForestParams, RandomForest};
use crate::ml::metrics::{mae, r2, rmse};
use crate::ml::regressor::Regressor;
use crate::types::measurement::Series;
use chrono::NaiveDateTime;
use log::info;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Validation is skipped below this many supervised rows.
const MIN_ROWS_FOR_VALIDATION: usize = 4;
const LOGGED_IMPORTANCES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationMetrics {
    pub rows: usize,
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub station_code: String,
    /// Supervised rows available before the split.
    pub rows: usize,
    pub train_rows: usize,
    pub train_r2: f64,
    /// `None` when there were too few rows to hold any out.
    pub validation: Option<ValidationMetrics>,
    /// `(column, importance)` sorted by descending importance.
    pub feature_importances: Vec<(String, f64)>,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: ForecastModel,
    pub report: TrainingReport,
}

/// Predictions against known targets over a series.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub mae: f64,
    pub rmse: f64,
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
    pub timestamps: Vec<NaiveDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct ForecastTrainer {
    builder: FeatureBuilder,
    config: TrainerConfig,
}

impl ForecastTrainer {
    pub fn new(features: FeatureConfig, trainer: TrainerConfig) -> Self {
        Self {
            builder: FeatureBuilder::new(features),
            config: trainer,
        }
    }

    pub fn feature_builder(&self) -> &FeatureBuilder {
        &self.builder
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn train_series(&self, series: &Series) -> Result<TrainingOutcome> {
        self.train(&self.builder.build(series))
    }

    /// Fits a random forest on the fully defined rows of `table`.
    ///
    /// With at least four rows a seeded shuffle holds out `ceil(n * test_size)` rows
    /// (at least one, never all) for validation and the forest is fitted on the rest.
    pub fn train(&self, table: &FeatureTable) -> Result<TrainingOutcome> {
        let columns = table.feature_columns();
        let set = table.supervised(&columns);
        if set.is_empty() {
            return Err(DataError::NoTrainingRows.into());
        }
        let rows = set.len();

        let split = split_indices(rows, self.config.test_size, self.config.random_state);
        let (train_idx, validation_idx) = match split {
            Some((train, validation)) => (train, Some(validation)),
            None => ((0..rows).collect(), None),
        };

        let x_train: Vec<Vec<f64>> = train_idx.iter().map(|&i| set.features[i].clone()).collect();
        let y_train: Vec<f64> = train_idx.iter().map(|&i| set.targets[i]).collect();
        let forest = RandomForest::fit(&x_train, &y_train, &ForestParams::from(&self.config))?;
        let train_r2 = r2(&y_train, &forest.predict(&x_train));

        let validation = validation_idx.map(|indices| {
            let x_val: Vec<Vec<f64>> = indices.iter().map(|&i| set.features[i].clone()).collect();
            let y_val: Vec<f64> = indices.iter().map(|&i| set.targets[i]).collect();
            let predicted = forest.predict(&x_val);
            ValidationMetrics {
                rows: y_val.len(),
                r2: r2(&y_val, &predicted),
                mae: mae(&y_val, &predicted),
                rmse: rmse(&y_val, &predicted),
            }
        });

        let mut feature_importances: Vec<(String, f64)> = columns
            .iter()
            .cloned()
            .zip(forest.feature_importances().iter().copied())
            .collect();
        feature_importances.sort_by_key(|(_, importance)| std::cmp::Reverse(OrderedFloat(*importance)));

        let report = TrainingReport {
            station_code: table.station_code().to_string(),
            rows,
            train_rows: y_train.len(),
            train_r2,
            validation,
            feature_importances,
        };
        log_report(&report);

        let model = ForecastModel::new(forest, columns)?;
        Ok(TrainingOutcome { model, report })
    }

    /// Predicts every row of `series` that has a target and all of the model's columns.
    pub fn evaluate<R: Regressor>(&self, model: &ForecastModel<R>, series: &Series) -> Result<Evaluation> {
        let table = self.builder.build(series);
        let set = table.supervised(model.feature_columns());
        if set.is_empty() {
            return Err(DataError::NoEvaluationRows.into());
        }
        let predicted = model.estimator().predict(&set.features);
        let evaluation = Evaluation {
            mae: mae(&set.targets, &predicted),
            rmse: rmse(&set.targets, &predicted),
            actual: set.targets,
            predicted,
            timestamps: set.timestamps,
        };
        info!(
            "Evaluated station {} on {} rows: MAE {:.3}, RMSE {:.3}",
            series.station_code(),
            evaluation.actual.len(),
            evaluation.mae,
            evaluation.rmse
        );
        Ok(evaluation)
    }
}

/// Seeded shuffle into `(train, validation)` index sets, both sorted.
fn split_indices(n: usize, test_size: f64, seed: u64) -> Option<(Vec<usize>, Vec<usize>)> {
    if n < MIN_ROWS_FOR_VALIDATION {
        return None;
    }
    let validation_rows = ((n as f64 * test_size).ceil() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let mut train = indices.split_off(validation_rows);
    let mut validation = indices;
    train.sort_unstable();
    validation.sort_unstable();
    Some((train, validation))
}

fn log_report(report: &TrainingReport) {
    info!(
        "Trained model for station {} on {} of {} rows, train R2 {:.4}",
        report.station_code, report.train_rows, report.rows, report.train_r2
    );
    match &report.validation {
        Some(v) => info!(
            "Validation on {} rows: R2 {:.4}, MAE {:.3}, RMSE {:.3}",
            v.rows, v.r2, v.mae, v.rmse
        ),
        None => info!("Too few rows for a validation split, trained on all of them"),
    }
    for (column, importance) in report.feature_importances.iter().take(LOGGED_IMPORTANCES) {
        info!("  {column}: {importance:.4}");
    }
}
