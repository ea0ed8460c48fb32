use crate::config::IngestConfig;
use crate::measurements::coverage::CoverageLedger;
use crate::measurements::error::StoreError;
use crate::measurements::ingest::{IngestSummary, Ingestor};
use crate::source::MeasurementSource;
use crate::types::measurement::{Measurement, Series};
use crate::types::timestamp::{from_epoch_millis, to_epoch_millis};
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use parking_lot::Mutex;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const MEASUREMENTS_FILE_NAME: &str = "measurements.parquet";
const COVERAGE_FILE_NAME: &str = "coverage.json";

/// Result of a [`MeasurementStore::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Measurements handed to the merge.
    pub incoming: usize,
    /// Keys that did not exist before.
    pub inserted: usize,
    /// Keys whose previous values were overwritten.
    pub replaced: usize,
    /// Rows in the store after the merge, all stations included.
    pub total: usize,
}

/// Durable, deduplicated cache of station measurements.
///
/// All rows live in a single parquet table keyed by `(station_code, timestamp)`,
/// sorted by that key. A JSON ledger next to it records which windows were fetched
/// from upstream. Every write goes to a temporary file in the store directory that
/// is then renamed over the old file, so concurrent readers always see a complete
/// table. Writers are serialized by an internal lock.
///
/// A range is served from the cache only when a previously fetched window is a
/// superset of it and at least one point falls inside it. Partial overlaps refetch
/// the whole requested range; gaps are never filled piecemeal.
pub struct MeasurementStore {
    store_dir: PathBuf,
    measurements_path: PathBuf,
    coverage_path: PathBuf,
    ingestor: Ingestor,
    write_lock: Mutex<()>,
}

impl MeasurementStore {
    /// Opens (creating if needed) a store rooted at `store_dir`.
    pub fn open(store_dir: &Path, ingest: &IngestConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(store_dir)
            .map_err(|e| StoreError::StoreDirCreation(store_dir.to_path_buf(), e))?;
        Ok(Self {
            store_dir: store_dir.to_path_buf(),
            measurements_path: store_dir.join(MEASUREMENTS_FILE_NAME),
            coverage_path: store_dir.join(COVERAGE_FILE_NAME),
            ingestor: Ingestor::new(ingest),
            write_lock: Mutex::new(()),
        })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// All cached measurements for the station with `start <= timestamp <= end`, ascending.
    ///
    /// This never fetches. An empty series means nothing is cached for the range.
    pub fn get_range(
        &self,
        station_code: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Series, StoreError> {
        if start > end {
            return Ok(Series::empty(station_code));
        }
        let predicate = col("station_code")
            .eq(lit(station_code))
            .and(col("timestamp").gt_eq(lit(to_epoch_millis(start))))
            .and(col("timestamp").lt_eq(lit(to_epoch_millis(end))));
        let measurements = self.read(Some(predicate))?;
        Ok(Series::new(station_code, measurements))
    }

    /// Whether `[start, end]` can be answered from the cache without fetching.
    pub fn covers(
        &self,
        station_code: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self.cached_if_covered(station_code, start, end)?.is_some())
    }

    /// Upserts `measurements` under `station_code`; incoming values replace existing ones.
    ///
    /// Measurements are re-keyed to `station_code` whatever their own code says.
    pub fn merge(
        &self,
        station_code: &str,
        measurements: Vec<Measurement>,
    ) -> Result<MergeSummary, StoreError> {
        let _guard = self.write_lock.lock();

        let mut rows: BTreeMap<(String, NaiveDateTime), (u32, u32)> = self
            .read(None)?
            .into_iter()
            .map(|m| {
                (
                    (m.station_code, m.timestamp),
                    (m.free_spaces, m.occupied_spaces),
                )
            })
            .collect();

        let mut summary = MergeSummary {
            incoming: measurements.len(),
            ..MergeSummary::default()
        };
        for measurement in measurements {
            let key = (station_code.to_string(), measurement.timestamp);
            let value = (measurement.free_spaces, measurement.occupied_spaces);
            match rows.insert(key, value) {
                Some(_) => summary.replaced += 1,
                None => summary.inserted += 1,
            }
        }
        summary.total = rows.len();

        let merged: Vec<Measurement> = rows
            .into_iter()
            .map(|((code, timestamp), (free, occupied))| {
                Measurement::new(code, timestamp, free, occupied)
            })
            .collect();
        self.write(&merged)?;

        info!(
            "Merged {} measurements for station {} ({} new, {} replaced, {} total rows)",
            summary.incoming, station_code, summary.inserted, summary.replaced, summary.total
        );
        Ok(summary)
    }

    /// Read-through access: serves `[start, end]` from the cache when covered,
    /// otherwise fetches the whole range from `source`, merges it and re-reads.
    ///
    /// A failing fetch is logged and leaves the cache untouched; whatever is cached
    /// for the range (possibly nothing) is returned.
    pub fn get_or_fetch<S: MeasurementSource + ?Sized>(
        &self,
        station_code: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        source: &S,
    ) -> Result<Series, StoreError> {
        if let Some(series) = self.cached_if_covered(station_code, start, end)? {
            info!(
                "Cache hit for station {} from {} to {} ({} rows)",
                station_code,
                start,
                end,
                series.len()
            );
            return Ok(series);
        }
        warn!(
            "Cache miss for station {} from {} to {}. Fetching from upstream.",
            station_code, start, end
        );
        self.fetch_and_merge(station_code, start, end, source)?;
        self.get_range(station_code, start, end)
    }

    /// Refetches `[start, end]` regardless of what is cached.
    pub fn refresh<S: MeasurementSource + ?Sized>(
        &self,
        station_code: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        source: &S,
    ) -> Result<Series, StoreError> {
        info!(
            "Force refreshing station {} from {} to {}",
            station_code, start, end
        );
        self.fetch_and_merge(station_code, start, end, source)?;
        self.get_range(station_code, start, end)
    }

    /// Sorted, distinct station codes present in the store.
    pub fn stations(&self) -> Result<Vec<String>, StoreError> {
        let codes: BTreeSet<String> = self
            .read(None)?
            .into_iter()
            .map(|m| m.station_code)
            .collect();
        Ok(codes.into_iter().collect())
    }

    /// Earliest and latest cached timestamps for the station.
    pub fn date_range(
        &self,
        station_code: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, StoreError> {
        let measurements = self.read(Some(col("station_code").eq(lit(station_code))))?;
        let series = Series::new(station_code, measurements);
        Ok(series
            .first()
            .zip(series.last())
            .map(|(first, last)| (first.timestamp, last.timestamp)))
    }

    fn cached_if_covered(
        &self,
        station_code: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Option<Series>, StoreError> {
        let ledger = CoverageLedger::load(&self.coverage_path)?;
        if !ledger.covers(station_code, start, end) {
            return Ok(None);
        }
        let series = self.get_range(station_code, start, end)?;
        Ok((!series.is_empty()).then_some(series))
    }

    fn fetch_and_merge<S: MeasurementSource + ?Sized>(
        &self,
        station_code: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        source: &S,
    ) -> Result<Option<IngestSummary>, StoreError> {
        let records = match source.fetch(station_code, start.date(), end.date()) {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    "Fetching station {} failed, keeping cached data: {}",
                    station_code, e
                );
                return Ok(None);
            }
        };

        let (measurements, summary) = self.ingestor.ingest(station_code, &records);
        if summary.skipped > 0 {
            warn!(
                "Skipped {} malformed records out of {} for station {}",
                summary.skipped, summary.records, station_code
            );
        }
        if !measurements.is_empty() {
            self.merge(station_code, measurements)?;
        }

        let _guard = self.write_lock.lock();
        let mut ledger = CoverageLedger::load(&self.coverage_path)?;
        ledger.record(station_code, start, end);
        ledger.save(&self.coverage_path)?;
        Ok(Some(summary))
    }

    fn read(&self, predicate: Option<Expr>) -> Result<Vec<Measurement>, StoreError> {
        if !self.measurements_path.exists() {
            return Ok(Vec::new());
        }
        let mut frame = LazyFrame::scan_parquet(&self.measurements_path, Default::default())
            .map_err(|e| StoreError::ParquetScan(self.measurements_path.clone(), e))?;
        if let Some(predicate) = predicate {
            frame = frame.filter(predicate);
        }
        let df = frame
            .collect()
            .map_err(|e| StoreError::ParquetScan(self.measurements_path.clone(), e))?;
        self.frame_to_measurements(&df)
    }

    fn frame_to_measurements(&self, df: &DataFrame) -> Result<Vec<Measurement>, StoreError> {
        let codes = df.column("station_code")?.str()?;
        let timestamps = df.column("timestamp")?.i64()?;
        let free = df.column("free_spaces")?.i64()?;
        let occupied = df.column("occupied_spaces")?.i64()?;

        let mut measurements = Vec::with_capacity(df.height());
        let rows = codes
            .into_iter()
            .zip(timestamps)
            .zip(free)
            .zip(occupied)
            .enumerate();
        for (row, (((code, millis), free), occupied)) in rows {
            let malformed = |message: &str| StoreError::MalformedRow {
                path: self.measurements_path.clone(),
                row,
                message: message.to_string(),
            };
            let (Some(code), Some(millis), Some(free), Some(occupied)) =
                (code, millis, free, occupied)
            else {
                return Err(malformed("null value"));
            };
            let timestamp =
                from_epoch_millis(millis).ok_or_else(|| malformed("timestamp out of range"))?;
            let free_spaces =
                u32::try_from(free).map_err(|_| malformed("free_spaces out of range"))?;
            let occupied_spaces =
                u32::try_from(occupied).map_err(|_| malformed("occupied_spaces out of range"))?;
            measurements.push(Measurement::new(
                code,
                timestamp,
                free_spaces,
                occupied_spaces,
            ));
        }
        Ok(measurements)
    }

    /// Writes the full table through a temporary file and an atomic rename.
    fn write(&self, measurements: &[Measurement]) -> Result<(), StoreError> {
        let codes: Vec<&str> = measurements
            .iter()
            .map(|m| m.station_code.as_str())
            .collect();
        let timestamps: Vec<i64> = measurements
            .iter()
            .map(|m| to_epoch_millis(m.timestamp))
            .collect();
        let free: Vec<i64> = measurements
            .iter()
            .map(|m| i64::from(m.free_spaces))
            .collect();
        let occupied: Vec<i64> = measurements
            .iter()
            .map(|m| i64::from(m.occupied_spaces))
            .collect();

        let mut df = df!(
            "station_code" => codes,
            "timestamp" => timestamps,
            "free_spaces" => free,
            "occupied_spaces" => occupied
        )?;

        let mut temp_file = NamedTempFile::new_in(&self.store_dir)
            .map_err(|e| StoreError::TempFile(self.store_dir.clone(), e))?;
        ParquetWriter::new(temp_file.as_file_mut())
            .with_compression(ParquetCompression::Snappy)
            .finish(&mut df)
            .map_err(|e| StoreError::ParquetWrite(self.measurements_path.clone(), e))?;
        temp_file
            .persist(&self.measurements_path)
            .map_err(|e| StoreError::Persist(self.measurements_path.clone(), e.error))?;
        debug!(
            "Wrote {} rows to {}",
            measurements.len(),
            self.measurements_path.display()
        );
        Ok(())
    }
}
