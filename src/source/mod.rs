//! Upstream collaborators: where raw measurements and the station list come from.
//!
//! The store and the station catalog only depend on these traits, so tests and
//! offline tools can plug in their own implementations.

pub mod error;
pub mod open_data_hub;

use crate::source::error::SourceError;
use crate::types::raw_record::RawRecord;
use crate::types::station::ParkingStation;
use chrono::NaiveDate;

/// Fetches raw point measurements for a station over an inclusive date range.
pub trait MeasurementSource {
    fn fetch(
        &self,
        station_code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<RawRecord>, SourceError>;
}

/// Fetches the list of known parking stations.
pub trait StationSource {
    fn fetch_stations(&self) -> Result<Vec<ParkingStation>, SourceError>;
}

impl<T: MeasurementSource + ?Sized> MeasurementSource for &T {
    fn fetch(
        &self,
        station_code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<RawRecord>, SourceError> {
        (**self).fetch(station_code, start_date, end_date)
    }
}

impl<T: StationSource + ?Sized> StationSource for &T {
    fn fetch_stations(&self) -> Result<Vec<ParkingStation>, SourceError> {
        (**self).fetch_stations()
    }
}
