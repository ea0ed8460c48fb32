//! Main entry point: a client that ties the measurement cache, the station catalog,
//! training, model persistence and forecasting together for one data source.

use crate::config::ForecastConfig;
use crate::error::{ParkingForecastError, Result};
use crate::forecast::error::ModelError;
use crate::forecast::forecaster::Forecaster;
use crate::forecast::repository::ModelRepository;
use crate::forecast::trainer::{Evaluation, ForecastTrainer, TrainingReport};
use crate::measurements::store::MeasurementStore;
use crate::source::open_data_hub::OpenDataHubClient;
use crate::source::{MeasurementSource, StationSource};
use crate::stations::catalog::StationCatalog;
use crate::types::measurement::Series;
use crate::types::station::ParkingStation;
use crate::utils::{ensure_cache_dir_exists, get_cache_dir};
use bon::bon;
use chrono::NaiveDateTime;
use log::warn;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};

const MEASUREMENTS_DIR_NAME: &str = "measurements";
const MODELS_DIR_NAME: &str = "models";

/// Parking occupancy client for one upstream source.
///
/// Measurements are cached under `<cache>/measurements`, the trained model under
/// `<cache>/models` and the station list in `<cache>/stations.bin`. A model found in
/// the cache folder is loaded on construction, so forecasts work right away after a
/// previous session trained one.
///
/// # Examples
///
/// ```no_run
/// use chrono::NaiveDate;
/// use parking_forecast::{ParkingForecast, ParkingForecastError};
///
/// # fn main() -> Result<(), ParkingForecastError> {
/// let client = ParkingForecast::open_data_hub()?;
/// let start = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
/// let end = NaiveDate::from_ymd_opt(2024, 4, 30).unwrap().and_hms_opt(23, 59, 59).unwrap();
///
/// let report = client.train().station("103").start(start).end(end).call()?;
/// println!("validation: {:?}", report.validation);
///
/// let (at, free) = client.predict().station("103").start(start).end(end).call()?;
/// println!("{free} free spaces expected at {at}");
/// # Ok(())
/// # }
/// ```
pub struct ParkingForecast<S> {
    source: S,
    cache_folder: PathBuf,
    store: MeasurementStore,
    repository: ModelRepository,
    trainer: ForecastTrainer,
    forecaster: RwLock<Forecaster>,
    catalog: Mutex<Option<StationCatalog>>,
}

impl ParkingForecast<OpenDataHubClient> {
    /// Client for the public Open Data Hub API using the default cache directory.
    pub fn open_data_hub() -> Result<Self> {
        Self::new(OpenDataHubClient::builder().build()?)
    }
}

#[bon]
impl<S: MeasurementSource + StationSource> ParkingForecast<S> {
    /// Creates a client that caches under `cache_folder`, creating it if needed.
    pub fn with_cache_folder(cache_folder: PathBuf, source: S) -> Result<Self> {
        Self::with_config(cache_folder, source, ForecastConfig::default())
    }

    /// Creates a client using the default cache directory
    /// (`<user cache dir>/parking_forecast_cache`).
    pub fn new(source: S) -> Result<Self> {
        let cache_folder = get_cache_dir().ok_or(ParkingForecastError::CacheDirResolution)?;
        Self::with_cache_folder(cache_folder, source)
    }

    pub fn with_config(cache_folder: PathBuf, source: S, config: ForecastConfig) -> Result<Self> {
        config.validate()?;
        ensure_cache_dir_exists(&cache_folder)
            .map_err(|e| ParkingForecastError::CacheDirCreation(cache_folder.clone(), e))?;

        let store =
            MeasurementStore::open(&cache_folder.join(MEASUREMENTS_DIR_NAME), &config.ingest)?;
        let repository = ModelRepository::new(cache_folder.join(MODELS_DIR_NAME));
        let forecaster = if repository.exists() {
            Forecaster::load(config.features.clone(), &repository).unwrap_or_else(|e| {
                warn!("Ignoring stored model in {}: {}", repository.dir().display(), e);
                Forecaster::new(config.features.clone())
            })
        } else {
            Forecaster::new(config.features.clone())
        };

        Ok(Self {
            source,
            store,
            repository,
            trainer: ForecastTrainer::new(config.features, config.trainer),
            forecaster: RwLock::new(forecaster),
            catalog: Mutex::new(None),
            cache_folder,
        })
    }

    pub fn cache_folder(&self) -> &Path {
        &self.cache_folder
    }

    pub fn store(&self) -> &MeasurementStore {
        &self.store
    }

    pub fn model_available(&self) -> bool {
        self.forecaster.read().is_ready()
    }

    /// Measurements for a station between `start` and `end` (inclusive), served from
    /// the cache when it already covers the range.
    ///
    /// `.force_refresh(true)` refetches the range even when it is cached.
    #[builder]
    pub fn series(
        &self,
        station: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        force_refresh: Option<bool>,
    ) -> Result<Series> {
        let series = if force_refresh.unwrap_or(false) {
            self.store.refresh(station, start, end, &self.source)?
        } else {
            self.store.get_or_fetch(station, start, end, &self.source)?
        };
        Ok(series)
    }

    /// Trains a model on the station's measurements in the range and makes it the
    /// active model. It is also written to the cache folder unless `.save(false)`.
    #[builder]
    pub fn train(
        &self,
        station: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        save: Option<bool>,
    ) -> Result<TrainingReport> {
        let series = self.series().station(station).start(start).end(end).call()?;
        let outcome = self.trainer.train_series(&series)?;
        if save.unwrap_or(true) {
            self.repository.save(&outcome.model)?;
        }
        self.forecaster.write().set_model(outcome.model);
        Ok(outcome.report)
    }

    /// Forecasts free spaces from the station's history in the range.
    ///
    /// Without `.at(..)` the forecast is for one hour after the last measurement.
    #[builder]
    pub fn predict(
        &self,
        station: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        at: Option<NaiveDateTime>,
    ) -> Result<(NaiveDateTime, u32)> {
        if !self.model_available() {
            return Err(ModelError::NotLoaded.into());
        }
        let series = self.series().station(station).start(start).end(end).call()?;
        let forecaster = self.forecaster.read();
        match at {
            Some(at) => Ok((at, forecaster.predict(&series, at)?)),
            None => forecaster.predict_next(&series),
        }
    }

    /// Scores the active model against the station's measurements in the range.
    #[builder]
    pub fn evaluate(
        &self,
        station: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Evaluation> {
        if !self.model_available() {
            return Err(ModelError::NotLoaded.into());
        }
        let series = self.series().station(station).start(start).end(end).call()?;
        let forecaster = self.forecaster.read();
        let model = forecaster.model().ok_or(ModelError::NotLoaded)?;
        self.trainer.evaluate(model, &series)
    }

    /// Stations near a point, nearest first, with their distance in kilometres.
    ///
    /// Defaults to 5 stations within 2 km.
    #[builder]
    pub fn find_stations(
        &self,
        latitude: f64,
        longitude: f64,
        max_distance_km: Option<f64>,
        station_limit: Option<usize>,
    ) -> Result<Vec<(ParkingStation, f64)>> {
        let max_distance_km = max_distance_km.unwrap_or(2.0);
        let station_limit = station_limit.unwrap_or(5);
        self.with_catalog(|catalog| {
            catalog.nearest(latitude, longitude, station_limit, max_distance_km)
        })
    }

    /// All known stations, sorted by code.
    pub fn stations(&self) -> Result<Vec<ParkingStation>> {
        self.with_catalog(|catalog| catalog.stations().into_iter().cloned().collect())
    }

    pub fn station(&self, code: &str) -> Result<Option<ParkingStation>> {
        self.with_catalog(|catalog| catalog.get(code).cloned())
    }

    /// Refetches the station list and replaces the cached one.
    pub fn refresh_stations(&self) -> Result<usize> {
        let catalog = StationCatalog::refresh(&self.cache_folder, &self.source)?;
        let count = catalog.len();
        *self.catalog.lock() = Some(catalog);
        Ok(count)
    }

    fn with_catalog<T>(&self, f: impl FnOnce(&StationCatalog) -> T) -> Result<T> {
        let mut guard = self.catalog.lock();
        let catalog = match guard.take() {
            Some(catalog) => catalog,
            None => StationCatalog::load_or_fetch(&self.cache_folder, &self.source)?,
        };
        let result = f(&catalog);
        *guard = Some(catalog);
        Ok(result)
    }
}
