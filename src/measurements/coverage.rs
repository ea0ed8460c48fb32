//! Ledger of the time windows that have been fetched from upstream per station.
//!
//! A cached range only counts as a hit if one recorded window contains it entirely.
//! Overlapping or touching windows are coalesced when recorded, since both sides
//! were fetched in full.

use crate::measurements::error::StoreError;
use crate::utils::write_bytes_atomically;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl FetchedWindow {
    fn contains(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start <= start && end <= self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageLedger {
    stations: BTreeMap<String, Vec<FetchedWindow>>,
}

impl CoverageLedger {
    /// Loads the ledger at `path`; a missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(StoreError::CoverageRead(path.to_path_buf(), e)),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::CoverageDecode(path.to_path_buf(), e))
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(self).map_err(StoreError::CoverageEncode)?;
        write_bytes_atomically(path, &bytes)
            .map_err(|e| StoreError::Persist(path.to_path_buf(), e))
    }

    pub fn record(&mut self, station_code: &str, start: NaiveDateTime, end: NaiveDateTime) {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let windows = self.stations.entry(station_code.to_string()).or_default();
        windows.push(FetchedWindow { start, end });
        windows.sort_by_key(|w| w.start);

        let mut coalesced: Vec<FetchedWindow> = Vec::with_capacity(windows.len());
        for window in windows.drain(..) {
            match coalesced.last_mut() {
                Some(last) if window.start <= last.end => {
                    last.end = last.end.max(window.end);
                }
                _ => coalesced.push(window),
            }
        }
        *windows = coalesced;
    }

    /// True if a single recorded window for the station contains `[start, end]`.
    pub fn covers(&self, station_code: &str, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.stations
            .get(station_code)
            .is_some_and(|windows| windows.iter().any(|w| w.contains(start, end)))
    }

    pub fn windows(&self, station_code: &str) -> &[FetchedWindow] {
        self.stations
            .get(station_code)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
