use crate::config::FeatureConfig;
use crate::error::Result;
use crate::features::builder::FeatureBuilder;
use crate::features::table::{is_history_column, FeatureRow};
use crate::forecast::error::{DataError, ModelError};
use crate::forecast::model::ForecastModel;
use crate::forecast::repository::ModelRepository;
use crate::ml::forest::RandomForest;
use crate::ml::regressor::Regressor;
use crate::types::measurement::Series;
use crate::types::timestamp::IntoUtcNaive;
use chrono::{Duration, NaiveDateTime};
use log::{debug, info};
use std::collections::BTreeMap;

/// Rounds a raw estimate to the nearest whole number of free spaces, never below 0.
/// Halves round to the even neighbour.
///
/// ```
/// use parking_forecast::clamp_prediction;
///
/// assert_eq!(clamp_prediction(-3.7), 0);
/// assert_eq!(clamp_prediction(17.4), 17);
/// assert_eq!(clamp_prediction(2.5), 2);
/// ```
pub fn clamp_prediction(raw: f64) -> u32 {
    if !raw.is_finite() {
        return 0;
    }
    raw.round_ties_even().clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Produces free-space forecasts from a trained model and the recent history of a station.
///
/// A forecaster starts without a model; [`Forecaster::set_model`] or
/// [`Forecaster::load`] make it ready. Predicting before that fails with
/// [`ModelError::NotLoaded`].
#[derive(Debug, Clone)]
pub struct Forecaster<R = RandomForest> {
    builder: FeatureBuilder,
    model: Option<ForecastModel<R>>,
}

impl Forecaster<RandomForest> {
    /// A forecaster with the model stored in `repository`.
    pub fn load(config: FeatureConfig, repository: &ModelRepository) -> Result<Self> {
        let model = repository.load()?;
        Ok(Self::with_model(config, model))
    }
}

impl<R: Regressor> Forecaster<R> {
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            builder: FeatureBuilder::new(config),
            model: None,
        }
    }

    pub fn with_model(config: FeatureConfig, model: ForecastModel<R>) -> Self {
        Self {
            builder: FeatureBuilder::new(config),
            model: Some(model),
        }
    }

    pub fn set_model(&mut self, model: ForecastModel<R>) {
        self.model = Some(model);
    }

    pub fn model(&self) -> Option<&ForecastModel<R>> {
        self.model.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    /// The vector fed to the estimator for `query_time`, in the model's column order.
    ///
    /// It is built from the latest row of `series` with the calendar fields replaced
    /// by those of `query_time`. Columns the latest row lacks fall back to its `free`
    /// value for lag and rolling columns and to 0 otherwise.
    pub fn feature_vector(
        &self,
        series: &Series,
        query_time: impl IntoUtcNaive,
    ) -> Result<Vec<f64>> {
        let model = self.model.as_ref().ok_or(ModelError::NotLoaded)?;
        let latest = self.latest_row(series)?;
        Ok(query_vector(model, &latest, query_time.into_utc_naive()))
    }

    /// Forecast of free spaces at `query_time`.
    pub fn predict(&self, series: &Series, query_time: impl IntoUtcNaive) -> Result<u32> {
        let model = self.model.as_ref().ok_or(ModelError::NotLoaded)?;
        let latest = self.latest_row(series)?;
        let query_time = query_time.into_utc_naive();
        let prediction = predict_at(model, &latest, query_time)?;
        info!(
            "Predicted {} free spaces for station {} at {}",
            prediction,
            series.station_code(),
            query_time
        );
        Ok(prediction)
    }

    /// Forecast one hour after the last measurement of `series`.
    pub fn predict_next(&self, series: &Series) -> Result<(NaiveDateTime, u32)> {
        let model = self.model.as_ref().ok_or(ModelError::NotLoaded)?;
        let latest = self.latest_row(series)?;
        let query_time = latest.timestamp + Duration::hours(1);
        Ok((query_time, predict_at(model, &latest, query_time)?))
    }

    /// Forecasts for several query times from a single feature build.
    pub fn predict_many<T: IntoUtcNaive>(
        &self,
        series: &Series,
        query_times: impl IntoIterator<Item = T>,
    ) -> Result<BTreeMap<NaiveDateTime, u32>> {
        let model = self.model.as_ref().ok_or(ModelError::NotLoaded)?;
        let latest = self.latest_row(series)?;
        query_times
            .into_iter()
            .map(|t| -> Result<(NaiveDateTime, u32)> {
                let t = t.into_utc_naive();
                Ok((t, predict_at(model, &latest, t)?))
            })
            .collect()
    }

    fn latest_row(&self, series: &Series) -> Result<FeatureRow> {
        let table = self.builder.build(series);
        table
            .latest()
            .cloned()
            .ok_or_else(|| DataError::EmptySeries(series.station_code().to_string()).into())
    }
}

fn query_vector<R: Regressor>(
    model: &ForecastModel<R>,
    latest: &FeatureRow,
    query_time: NaiveDateTime,
) -> Vec<f64> {
    let mut row = latest.clone();
    row.set_calendar(query_time);
    model
        .feature_columns()
        .iter()
        .map(|column| {
            row.value(column).unwrap_or_else(|| {
                if is_history_column(column) {
                    row.free
                } else {
                    0.0
                }
            })
        })
        .collect()
}

fn predict_at<R: Regressor>(
    model: &ForecastModel<R>,
    latest: &FeatureRow,
    query_time: NaiveDateTime,
) -> Result<u32> {
    let vector = query_vector(model, latest, query_time);
    let raw = model.predict_vector(&vector)?;
    debug!("Raw estimate {raw:.3} at {query_time}");
    Ok(clamp_prediction(raw))
}
