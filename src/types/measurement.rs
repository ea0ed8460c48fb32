//! Defines the occupancy measurement record and the ordered, deduplicated series
//! that every read from the measurement store produces.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single free/occupied observation for one parking station.
///
/// The identity of a measurement is `(station_code, timestamp)`. Timestamps are
/// normalized to UTC and stored without an offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// The station identifier used by the upstream data source (e.g. `"103"`).
    pub station_code: String,
    /// Observation time in UTC.
    pub timestamp: NaiveDateTime,
    /// Number of free parking spaces at `timestamp`.
    pub free_spaces: u32,
    /// Number of occupied parking spaces at `timestamp`.
    pub occupied_spaces: u32,
}

impl Measurement {
    pub fn new(
        station_code: impl Into<String>,
        timestamp: NaiveDateTime,
        free_spaces: u32,
        occupied_spaces: u32,
    ) -> Self {
        Self {
            station_code: station_code.into(),
            timestamp,
            free_spaces,
            occupied_spaces,
        }
    }
}

/// An ordered sequence of measurements for one station.
///
/// A `Series` is always sorted ascending by timestamp and contains at most one
/// measurement per timestamp. When the input holds several measurements with the
/// same timestamp, the one that appeared last wins.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use parking_forecast::{Measurement, Series};
///
/// let t = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
/// let series = Series::new(
///     "103",
///     vec![
///         Measurement::new("103", t, 10, 5),
///         Measurement::new("103", t, 12, 3),
///     ],
/// );
/// assert_eq!(series.len(), 1);
/// assert_eq!(series.measurements()[0].free_spaces, 12);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Series {
    station_code: String,
    measurements: Vec<Measurement>,
}

impl Series {
    /// Builds a series, sorting by timestamp and dropping duplicate timestamps (keep last).
    pub fn new(station_code: impl Into<String>, mut measurements: Vec<Measurement>) -> Self {
        // Stable sort keeps arrival order for equal timestamps, so "last" stays last.
        measurements.sort_by_key(|m| m.timestamp);

        let mut deduplicated: Vec<Measurement> = Vec::with_capacity(measurements.len());
        for measurement in measurements {
            if let Some(previous) = deduplicated.last_mut() {
                if previous.timestamp == measurement.timestamp {
                    *previous = measurement;
                    continue;
                }
            }
            deduplicated.push(measurement);
        }

        Self {
            station_code: station_code.into(),
            measurements: deduplicated,
        }
    }

    pub fn empty(station_code: impl Into<String>) -> Self {
        Self {
            station_code: station_code.into(),
            measurements: Vec::new(),
        }
    }

    pub fn station_code(&self) -> &str {
        &self.station_code
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn first(&self) -> Option<&Measurement> {
        self.measurements.first()
    }

    pub fn last(&self) -> Option<&Measurement> {
        self.measurements.last()
    }

    pub fn into_measurements(self) -> Vec<Measurement> {
        self.measurements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_series_sorts_and_keeps_last_duplicate() {
        let series = Series::new(
            "7",
            vec![
                Measurement::new("7", at(9, 10), 3, 7),
                Measurement::new("7", at(9, 0), 1, 9),
                Measurement::new("7", at(9, 10), 4, 6),
                Measurement::new("7", at(9, 5), 2, 8),
            ],
        );

        let timestamps: Vec<_> = series.measurements().iter().map(|m| m.timestamp).collect();
        assert_eq!(timestamps, vec![at(9, 0), at(9, 5), at(9, 10)]);
        assert_eq!(series.last().map(|m| m.free_spaces), Some(4));
        assert_eq!(series.station_code(), "7");
    }

    #[test]
    fn test_empty_series() {
        let series = Series::empty("7");
        assert!(series.is_empty());
        assert!(series.first().is_none());
    }
}
