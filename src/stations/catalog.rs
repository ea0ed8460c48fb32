use crate::source::StationSource;
use crate::stations::error::StationCatalogError;
use crate::types::station::ParkingStation;
use crate::utils::{write_bytes_atomically, BINCODE_CONFIG};
use haversine::{distance, Location as HaversineLocation, Units};
use log::{info, warn};
use ordered_float::OrderedFloat;
use rstar::RTree;
use std::collections::HashMap;
use std::path::Path;

pub const STATIONS_CACHE_FILE_NAME: &str = "stations.bin";

/// Known parking stations, indexed by code and by location.
#[derive(Debug, Clone)]
pub struct StationCatalog {
    rtree: RTree<ParkingStation>,
    by_code: HashMap<String, ParkingStation>,
}

impl StationCatalog {
    pub fn from_stations(stations: Vec<ParkingStation>) -> Self {
        let by_code = stations
            .iter()
            .map(|station| (station.code.clone(), station.clone()))
            .collect();
        Self {
            rtree: RTree::bulk_load(stations),
            by_code,
        }
    }

    /// Loads the catalog cached in `cache_dir`, or fetches it from `source` and caches it.
    pub fn load_or_fetch<S: StationSource + ?Sized>(
        cache_dir: &Path,
        source: &S,
    ) -> Result<Self, StationCatalogError> {
        let cache_file = cache_dir.join(STATIONS_CACHE_FILE_NAME);
        if cache_file.exists() {
            let stations = Self::get_cached_stations(&cache_file)?;
            info!(
                "Loaded {} stations from {}",
                stations.len(),
                cache_file.display()
            );
            return Ok(Self::from_stations(stations));
        }
        warn!(
            "Station cache {} not found. Fetching from upstream.",
            cache_file.display()
        );
        Self::refresh(cache_dir, source)
    }

    /// Fetches the station list from `source` and overwrites the cache.
    pub fn refresh<S: StationSource + ?Sized>(
        cache_dir: &Path,
        source: &S,
    ) -> Result<Self, StationCatalogError> {
        let stations = source.fetch_stations()?;
        Self::cache_stations(&stations, &cache_dir.join(STATIONS_CACHE_FILE_NAME))?;
        Ok(Self::from_stations(stations))
    }

    fn get_cached_stations(cache_path: &Path) -> Result<Vec<ParkingStation>, StationCatalogError> {
        let bytes = std::fs::read(cache_path)
            .map_err(|e| StationCatalogError::CacheRead(cache_path.to_path_buf(), e))?;
        let (stations, _) =
            bincode::serde::decode_from_slice::<Vec<ParkingStation>, _>(&bytes, BINCODE_CONFIG)
                .map_err(|e| {
                    StationCatalogError::CacheDecode(cache_path.to_path_buf(), Box::new(e))
                })?;
        Ok(stations)
    }

    fn cache_stations(
        stations: &[ParkingStation],
        cache_path: &Path,
    ) -> Result<(), StationCatalogError> {
        let bytes = bincode::serde::encode_to_vec(stations, BINCODE_CONFIG)
            .map_err(|e| StationCatalogError::CacheEncode(Box::new(e)))?;
        write_bytes_atomically(cache_path, &bytes)
            .map_err(|e| StationCatalogError::CacheWrite(cache_path.to_path_buf(), e))?;
        info!(
            "Cached {} stations ({} bytes) to {}",
            stations.len(),
            bytes.len(),
            cache_path.display()
        );
        Ok(())
    }

    pub fn get(&self, code: &str) -> Option<&ParkingStation> {
        self.by_code.get(code)
    }

    /// All stations, sorted by code.
    pub fn stations(&self) -> Vec<&ParkingStation> {
        let mut stations: Vec<&ParkingStation> = self.by_code.values().collect();
        stations.sort_by(|a, b| a.code.cmp(&b.code));
        stations
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Up to `limit` stations within `max_distance_km` of the point, nearest first,
    /// with their haversine distance in kilometres.
    pub fn nearest(
        &self,
        latitude: f64,
        longitude: f64,
        limit: usize,
        max_distance_km: f64,
    ) -> Vec<(ParkingStation, f64)> {
        if limit == 0 {
            return vec![];
        }
        let origin = HaversineLocation {
            latitude,
            longitude,
        };

        // Degree-space order differs from great-circle order, so over-fetch candidates.
        let candidate_limit = (limit * 2).max(20);
        let mut candidates: Vec<(ParkingStation, f64)> = self
            .rtree
            .nearest_neighbor_iter(&[latitude, longitude])
            .take(candidate_limit)
            .filter_map(|station| {
                let dist_km = distance(
                    HaversineLocation {
                        latitude: origin.latitude,
                        longitude: origin.longitude,
                    },
                    HaversineLocation {
                        latitude: station.location.latitude,
                        longitude: station.location.longitude,
                    },
                    Units::Kilometers,
                );
                (dist_km <= max_distance_km).then(|| (station.clone(), dist_km))
            })
            .collect();

        candidates.sort_by_key(|(_, dist_km)| OrderedFloat(*dist_km));
        candidates.truncate(limit);
        candidates
    }
}
