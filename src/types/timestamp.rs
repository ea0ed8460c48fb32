//! Normalization of timestamps to naive UTC, the representation used by the store,
//! the feature builder and the forecaster.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};

/// Converts a point in time into a naive UTC `NaiveDateTime`.
///
/// Naive inputs are assumed to already be UTC.
pub trait IntoUtcNaive {
    fn into_utc_naive(self) -> NaiveDateTime;
}

impl IntoUtcNaive for NaiveDateTime {
    fn into_utc_naive(self) -> NaiveDateTime {
        self
    }
}

impl IntoUtcNaive for DateTime<Utc> {
    fn into_utc_naive(self) -> NaiveDateTime {
        self.naive_utc()
    }
}

impl IntoUtcNaive for DateTime<FixedOffset> {
    fn into_utc_naive(self) -> NaiveDateTime {
        self.naive_utc()
    }
}

impl IntoUtcNaive for DateTime<Local> {
    fn into_utc_naive(self) -> NaiveDateTime {
        self.naive_utc()
    }
}

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%z"];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses an upstream timestamp string into naive UTC.
///
/// Accepted forms, tried in order:
/// * RFC 3339 (`2024-05-01T08:00:00Z`, `2024-05-01T10:00:00+02:00`)
/// * Open Data Hub style with a numeric offset (`2024-05-01 10:00:00.000+0200`)
/// * naive date-times with `T` or a space, optional fractional seconds (taken as UTC)
/// * a bare date (`2024-05-01`, midnight UTC)
///
/// Returns `None` if nothing matches.
///
/// # Examples
///
/// ```
/// use parking_forecast::parse_timestamp;
///
/// let a = parse_timestamp("2024-05-01 10:00:00.000+0200").unwrap();
/// let b = parse_timestamp("2024-05-01T08:00:00Z").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.into_utc_naive());
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.into_utc_naive());
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Milliseconds since the Unix epoch for a naive UTC timestamp.
pub(crate) fn to_epoch_millis(timestamp: NaiveDateTime) -> i64 {
    timestamp.and_utc().timestamp_millis()
}

pub(crate) fn from_epoch_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}
