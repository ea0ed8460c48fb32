//! Shared fixtures for unit tests.

use crate::source::error::SourceError;
use crate::source::{MeasurementSource, StationSource};
use crate::types::measurement::{Measurement, Series};
use crate::types::raw_record::RawRecord;
use crate::types::station::{Coordinate, ParkingStation};
use crate::types::timestamp::parse_timestamp;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const CAPACITY: u32 = 50;

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// `n` five-minute observations starting at `start`, two raw records each.
pub fn raw_records(start: NaiveDateTime, n: u32, free: impl Fn(u32) -> u32) -> Vec<RawRecord> {
    (0..n)
        .flat_map(|i| {
            let timestamp = (start + Duration::minutes(5 * i64::from(i)))
                .format("%Y-%m-%d %H:%M:%S%.3f+0000")
                .to_string();
            let free = free(i);
            [
                RawRecord::new(timestamp.clone(), "free", f64::from(free)),
                RawRecord::new(timestamp, "occupied", f64::from(CAPACITY.saturating_sub(free))),
            ]
        })
        .collect()
}

/// Series with one measurement every `step_minutes`, free counts taken from `free`.
pub fn series_from_free(
    station_code: &str,
    start: NaiveDateTime,
    step_minutes: i64,
    free: &[u32],
) -> Series {
    let measurements = free
        .iter()
        .enumerate()
        .map(|(i, &free)| {
            Measurement::new(
                station_code,
                start + Duration::minutes(step_minutes * i as i64),
                free,
                CAPACITY.saturating_sub(free),
            )
        })
        .collect();
    Series::new(station_code, measurements)
}

pub fn station(code: &str, latitude: f64, longitude: f64) -> ParkingStation {
    ParkingStation {
        code: code.to_string(),
        name: format!("P{code}"),
        municipality: Some("Bolzano - Bozen".to_string()),
        location: Coordinate {
            latitude,
            longitude,
        },
    }
}

/// In-memory upstream that serves fixed records filtered by date and counts calls.
#[derive(Debug, Default)]
pub struct FakeSource {
    records: Vec<RawRecord>,
    stations: Vec<ParkingStation>,
    fail: bool,
    calls: AtomicUsize,
    station_calls: AtomicUsize,
}

impl FakeSource {
    pub fn with_records(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn with_stations(stations: Vec<ParkingStation>) -> Self {
        Self {
            stations,
            ..Self::default()
        }
    }

    pub fn and_stations(mut self, stations: Vec<ParkingStation>) -> Self {
        self.stations = stations;
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn station_calls(&self) -> usize {
        self.station_calls.load(Ordering::SeqCst)
    }
}

impl MeasurementSource for FakeSource {
    fn fetch(
        &self,
        _station_code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<RawRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SourceError::Unavailable("fake outage".to_string()));
        }
        Ok(self
            .records
            .iter()
            .filter(|record| {
                record
                    .timestamp
                    .as_deref()
                    .and_then(parse_timestamp)
                    .is_some_and(|t| t.date() >= start_date && t.date() <= end_date)
            })
            .cloned()
            .collect())
    }
}

impl StationSource for FakeSource {
    fn fetch_stations(&self) -> Result<Vec<ParkingStation>, SourceError> {
        self.station_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SourceError::Unavailable("fake outage".to_string()));
        }
        Ok(self.stations.clone())
    }
}
