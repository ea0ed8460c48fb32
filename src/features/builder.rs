use crate::config::FeatureConfig;
use crate::features::table::{FeatureRow, FeatureTable, RollingStats};
use crate::types::measurement::Series;
use log::debug;

/// Series shorter than this keep the raw value as rolling mean and 0 as rolling std.
const MIN_ROWS_FOR_ROLLING: usize = 6;

/// Deterministic `Series -> FeatureTable` transformation.
///
/// ```
/// use chrono::{Duration, NaiveDate};
/// use parking_forecast::{FeatureBuilder, FeatureConfig, Measurement, Series};
///
/// let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
/// let measurements = (0..60)
///     .map(|i| Measurement::new("103", start + Duration::minutes(5 * i), 20, 30))
///     .collect();
/// let table = FeatureBuilder::new(FeatureConfig::default()).build(&Series::new("103", measurements));
///
/// assert_eq!(table.len(), 60);
/// assert_eq!(table.lag_steps(), 12);
/// assert!(table.feature_columns().contains(&"free_lag_12".to_string()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// `lag_steps` for series of at least four times that length, `max(1, n / 4)` otherwise.
    pub fn effective_lag_steps(&self, n: usize) -> usize {
        let lag_steps = self.config.lag_steps.max(1);
        if n >= 4 * lag_steps {
            lag_steps
        } else {
            (n / 4).max(1)
        }
    }

    /// `min(horizon, max(1, n / 3))`.
    pub fn effective_horizon(&self, n: usize) -> usize {
        self.config.horizon.max(1).min((n / 3).max(1))
    }

    pub fn build(&self, series: &Series) -> FeatureTable {
        let measurements = series.measurements();
        let n = measurements.len();
        let lag_steps = self.effective_lag_steps(n);
        let horizon = self.effective_horizon(n);

        let free: Vec<f64> = measurements
            .iter()
            .map(|m| f64::from(m.free_spaces))
            .collect();

        let mut rows: Vec<FeatureRow> = measurements
            .iter()
            .map(|m| FeatureRow::new(m.timestamp, f64::from(m.free_spaces), f64::from(m.occupied_spaces)))
            .collect();

        for i in 1..n {
            let elapsed = measurements[i].timestamp - measurements[i - 1].timestamp;
            rows[i].time_diff = elapsed.num_milliseconds() as f64 / 1000.0;
        }

        for (i, row) in rows.iter_mut().enumerate() {
            row.lags = (1..=lag_steps)
                .map(|k| i.checked_sub(k).map(|j| free[j]))
                .collect();
            row.rate_of_change = rate_of_change(row.free, row.lag(1), row.time_diff);
            row.target = free.get(i + horizon).copied();
        }

        if let Some(window) = self.config.rolling_window {
            let window = window.max(1);
            for (i, row) in rows.iter_mut().enumerate() {
                row.rolling = Some(if n >= MIN_ROWS_FOR_ROLLING {
                    trailing_stats(&free[(i + 1).saturating_sub(window)..=i])
                } else {
                    RollingStats {
                        mean: free[i],
                        std: 0.0,
                    }
                });
            }
        }

        debug!(
            "Built {} feature rows for station {} (lags {}, horizon {})",
            n,
            series.station_code(),
            lag_steps,
            horizon
        );
        FeatureTable::new(
            series.station_code().to_string(),
            rows,
            lag_steps,
            horizon,
            self.config.rolling_window.is_some(),
        )
    }
}

fn rate_of_change(free: f64, previous: Option<f64>, time_diff: f64) -> f64 {
    let Some(previous) = previous else {
        return 0.0;
    };
    if time_diff == 0.0 {
        return 0.0;
    }
    let rate = (free - previous) / time_diff;
    if rate.is_finite() {
        rate
    } else {
        0.0
    }
}

/// Mean and sample standard deviation (ddof 1); std is 0 for a single value.
fn trailing_stats(values: &[f64]) -> RollingStats {
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let std = if values.len() > 1 {
        let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (squares / (count - 1.0)).sqrt()
    } else {
        0.0
    };
    RollingStats { mean, std }
}
