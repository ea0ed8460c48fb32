//! Parking occupancy forecasting.
//!
//! Fetches free/occupied measurements for parking stations, keeps them in a local
//! parquet cache, derives calendar, lag and rate-of-change features and trains a
//! random forest that forecasts the number of free spaces at a future time.
//!
//! [`ParkingForecast`] wires everything together; the building blocks
//! ([`MeasurementStore`], [`FeatureBuilder`], [`ForecastTrainer`], [`Forecaster`],
//! [`ModelRepository`], [`StationCatalog`]) can also be used on their own.

mod config;
mod error;
mod features;
mod forecast;
mod measurements;
mod ml;
mod parking_forecast;
mod source;
mod stations;
mod types;
mod utils;

#[cfg(test)]
mod testing;

pub use config::{ConfigurationError, FeatureConfig, ForecastConfig, IngestConfig, TrainerConfig};
pub use error::{ParkingForecastError, Result};
pub use parking_forecast::ParkingForecast;

pub use types::measurement::{Measurement, Series};
pub use types::raw_record::RawRecord;
pub use types::station::{Coordinate, ParkingStation};
pub use types::timestamp::{parse_timestamp, IntoUtcNaive};

pub use measurements::coverage::{CoverageLedger, FetchedWindow};
pub use measurements::error::StoreError;
pub use measurements::ingest::{IngestSummary, Ingestor};
pub use measurements::{MeasurementStore, MergeSummary};

pub use features::table::{lag_column, BASE_FEATURE_COLUMNS};
pub use features::{FeatureBuilder, FeatureRow, FeatureTable, RollingStats, SupervisedSet};

pub use forecast::error::{DataError, ModelError};
pub use forecast::{
    clamp_prediction, Evaluation, ForecastModel, ForecastTrainer, Forecaster, ModelRepository,
    TrainingOutcome, TrainingReport, ValidationMetrics,
};

pub use ml::metrics;
pub use ml::{ForestParams, RandomForest, RegressionTree, Regressor, TreeParams};

pub use source::error::SourceError;
pub use source::open_data_hub::{OpenDataHubClient, DEFAULT_BASE_URL};
pub use source::{MeasurementSource, StationSource};

pub use stations::error::StationCatalogError;
pub use stations::StationCatalog;

pub use utils::get_cache_dir;
