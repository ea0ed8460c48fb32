//! Tunables for feature engineering, training and ingestion.
//!
//! Every section has a `Default` carrying the values the forecasting pipeline was
//! designed around (five-minute sampling, one-hour lookback and horizon). A full
//! configuration can also be read from JSON, where missing fields fall back to
//! those defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("lag_steps must be at least 1, got {0}")]
    InvalidLagSteps(usize),

    #[error("horizon must be at least 1, got {0}")]
    InvalidHorizon(usize),

    #[error("rolling_window must be at least 2 when set, got {0}")]
    InvalidRollingWindow(usize),

    #[error("test_size must be within (0, 1), got {0}")]
    InvalidTestSize(f64),

    #[error("n_estimators must be at least 1")]
    InvalidEstimatorCount,

    #[error("min_samples_split must be at least 2, got {0}")]
    InvalidMinSamplesSplit(usize),

    #[error("min_samples_leaf must be at least 1, got {0}")]
    InvalidMinSamplesLeaf(usize),

    #[error("max_depth must be at least 1 when set")]
    InvalidMaxDepth,

    #[error("chunk_size must be at least 1")]
    InvalidChunkSize,

    #[error("Failed to read configuration file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse configuration file '{0}'")]
    Parse(PathBuf, #[source] serde_json::Error),
}

/// Controls how a measurement series becomes a feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Nominal number of `free_lag_k` columns. Shrinks for short series.
    pub lag_steps: usize,
    /// Nominal number of rows the target is shifted ahead. Shrinks for short series.
    pub horizon: usize,
    /// Window for `free_rolling_mean`/`free_rolling_std`. `None` disables both columns.
    pub rolling_window: Option<usize>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lag_steps: 12,
            horizon: 12,
            rolling_window: Some(3),
        }
    }
}

impl FeatureConfig {
    pub fn with_lag_steps(mut self, lag_steps: usize) -> Self {
        self.lag_steps = lag_steps;
        self
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_rolling_window(mut self, rolling_window: Option<usize>) -> Self {
        self.rolling_window = rolling_window;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.lag_steps == 0 {
            return Err(ConfigurationError::InvalidLagSteps(self.lag_steps));
        }
        if self.horizon == 0 {
            return Err(ConfigurationError::InvalidHorizon(self.horizon));
        }
        match self.rolling_window {
            Some(window) if window < 2 => Err(ConfigurationError::InvalidRollingWindow(window)),
            _ => Ok(()),
        }
    }
}

/// Random forest and validation split settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Fraction of rows held out for validation.
    pub test_size: f64,
    /// Seed for the validation shuffle and the per-tree bootstrap samples.
    pub random_state: u64,
    pub n_estimators: usize,
    /// `None` grows trees until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            random_state: 42,
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl TrainerConfig {
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ConfigurationError::InvalidTestSize(self.test_size));
        }
        if self.n_estimators == 0 {
            return Err(ConfigurationError::InvalidEstimatorCount);
        }
        if self.min_samples_split < 2 {
            return Err(ConfigurationError::InvalidMinSamplesSplit(
                self.min_samples_split,
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(ConfigurationError::InvalidMinSamplesLeaf(
                self.min_samples_leaf,
            ));
        }
        if self.max_depth == Some(0) {
            return Err(ConfigurationError::InvalidMaxDepth);
        }
        Ok(())
    }
}

/// Raw record ingestion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Number of raw records grouped per parallel work item.
    pub chunk_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { chunk_size: 1000 }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.chunk_size == 0 {
            return Err(ConfigurationError::InvalidChunkSize);
        }
        Ok(())
    }
}

/// Complete pipeline configuration.
///
/// # Examples
///
/// ```
/// use parking_forecast::{ForecastConfig, FeatureConfig};
///
/// let config = ForecastConfig {
///     features: FeatureConfig::default().with_rolling_window(None),
///     ..ForecastConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub features: FeatureConfig,
    pub trainer: TrainerConfig,
    pub ingest: IngestConfig,
}

impl ForecastConfig {
    /// Reads and validates a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Read(path.to_path_buf(), e))?;
        let config: ForecastConfig = serde_json::from_str(&text)
            .map_err(|e| ConfigurationError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.features.validate()?;
        self.trainer.validate()?;
        self.ingest.validate()
    }
}
