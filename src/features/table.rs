use chrono::{Datelike, NaiveDateTime, Timelike};

pub const HOUR: &str = "hour";
pub const DAY_OF_WEEK: &str = "day_of_week";
pub const DAY_OF_MONTH: &str = "day_of_month";
pub const MONTH: &str = "month";
pub const YEAR: &str = "year";
pub const FREE: &str = "free";
pub const OCCUPIED: &str = "occupied";
pub const TIME_DIFF: &str = "time_diff";
pub const RATE_OF_CHANGE: &str = "rate_of_change";
pub const ROLLING_MEAN: &str = "free_rolling_mean";
pub const ROLLING_STD: &str = "free_rolling_std";
const LAG_PREFIX: &str = "free_lag_";

/// Columns every model is trained on, in order, before the lag and rolling columns.
pub const BASE_FEATURE_COLUMNS: [&str; 8] = [
    HOUR,
    DAY_OF_WEEK,
    DAY_OF_MONTH,
    MONTH,
    YEAR,
    FREE,
    OCCUPIED,
    RATE_OF_CHANGE,
];

pub fn lag_column(k: usize) -> String {
    format!("{LAG_PREFIX}{k}")
}

/// Parses `free_lag_k` into `k`.
pub fn lag_index(column: &str) -> Option<usize> {
    column
        .strip_prefix(LAG_PREFIX)
        .and_then(|k| k.parse::<usize>().ok())
        .filter(|&k| k >= 1)
}

/// Lag and rolling columns describe past `free` values.
pub fn is_history_column(column: &str) -> bool {
    column == ROLLING_MEAN || column == ROLLING_STD || lag_index(column).is_some()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingStats {
    pub mean: f64,
    pub std: f64,
}

/// One row of the feature table, aligned with one measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub timestamp: NaiveDateTime,
    pub hour: u32,
    /// Monday is 0.
    pub day_of_week: u32,
    pub day_of_month: u32,
    pub month: u32,
    pub year: i32,
    pub free: f64,
    pub occupied: f64,
    /// Seconds since the previous row; 1.0 for the first row.
    pub time_diff: f64,
    /// `lags[k - 1]` is `free` k rows earlier, `None` where that row does not exist.
    pub lags: Vec<Option<f64>>,
    /// Free spaces per second relative to the previous row.
    pub rate_of_change: f64,
    /// `None` when rolling features are disabled.
    pub rolling: Option<RollingStats>,
    /// `free` a fixed number of rows ahead, `None` near the end of the series.
    pub target: Option<f64>,
}

impl FeatureRow {
    pub(crate) fn new(timestamp: NaiveDateTime, free: f64, occupied: f64) -> Self {
        let mut row = Self {
            timestamp,
            hour: 0,
            day_of_week: 0,
            day_of_month: 0,
            month: 0,
            year: 0,
            free,
            occupied,
            time_diff: 1.0,
            lags: Vec::new(),
            rate_of_change: 0.0,
            rolling: None,
            target: None,
        };
        row.set_calendar(timestamp);
        row
    }

    /// Overwrites the calendar fields (not `timestamp`) from `at`.
    pub fn set_calendar(&mut self, at: NaiveDateTime) {
        self.hour = at.hour();
        self.day_of_week = at.weekday().num_days_from_monday();
        self.day_of_month = at.day();
        self.month = at.month();
        self.year = at.year();
    }

    /// `free` value `k` rows earlier (1-based).
    pub fn lag(&self, k: usize) -> Option<f64> {
        k.checked_sub(1)
            .and_then(|i| self.lags.get(i).copied().flatten())
    }

    /// Value of a named feature column, `None` if undefined for this row or unknown.
    pub fn value(&self, column: &str) -> Option<f64> {
        match column {
            HOUR => Some(f64::from(self.hour)),
            DAY_OF_WEEK => Some(f64::from(self.day_of_week)),
            DAY_OF_MONTH => Some(f64::from(self.day_of_month)),
            MONTH => Some(f64::from(self.month)),
            YEAR => Some(f64::from(self.year)),
            FREE => Some(self.free),
            OCCUPIED => Some(self.occupied),
            TIME_DIFF => Some(self.time_diff),
            RATE_OF_CHANGE => Some(self.rate_of_change),
            ROLLING_MEAN => self.rolling.map(|r| r.mean),
            ROLLING_STD => self.rolling.map(|r| r.std),
            other => lag_index(other).and_then(|k| self.lag(k)),
        }
    }
}

/// Feature matrix, targets and row timestamps of the fully defined rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupervisedSet {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub timestamps: Vec<NaiveDateTime>,
}

impl SupervisedSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Output of [`FeatureBuilder::build`](crate::features::FeatureBuilder::build).
///
/// Has exactly one row per measurement of the input series, in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    station_code: String,
    rows: Vec<FeatureRow>,
    lag_steps: usize,
    horizon: usize,
    rolling: bool,
}

impl FeatureTable {
    pub(crate) fn new(
        station_code: String,
        rows: Vec<FeatureRow>,
        lag_steps: usize,
        horizon: usize,
        rolling: bool,
    ) -> Self {
        Self {
            station_code,
            rows,
            lag_steps,
            horizon,
            rolling,
        }
    }

    pub fn station_code(&self) -> &str {
        &self.station_code
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Effective number of lag columns after shrinking for short series.
    pub fn lag_steps(&self) -> usize {
        self.lag_steps
    }

    /// Effective number of rows the target is shifted ahead.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Model input columns: the base columns, `free_lag_1..=free_lag_L`, then the
    /// rolling columns when enabled.
    pub fn feature_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = BASE_FEATURE_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .collect();
        columns.extend((1..=self.lag_steps).map(lag_column));
        if self.rolling {
            columns.push(ROLLING_MEAN.to_string());
            columns.push(ROLLING_STD.to_string());
        }
        columns
    }

    /// Rows where every one of `columns` and the target are defined.
    pub fn supervised(&self, columns: &[String]) -> SupervisedSet {
        let mut set = SupervisedSet::default();
        for row in &self.rows {
            let Some(target) = row.target else {
                continue;
            };
            let features: Option<Vec<f64>> = columns.iter().map(|c| row.value(c)).collect();
            if let Some(features) = features {
                set.features.push(features);
                set.targets.push(target);
                set.timestamps.push(row.timestamp);
            }
        }
        set
    }

    /// The most recent row, whether or not it has a target.
    pub fn latest(&self) -> Option<&FeatureRow> {
        self.rows.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::at;

    #[test]
    fn test_calendar_fields_use_monday_zero() {
        // 2024-05-05 is a Sunday.
        let row = FeatureRow::new(at(2024, 5, 5, 17, 45), 3.0, 7.0);
        assert_eq!(row.day_of_week, 6);
        assert_eq!(row.hour, 17);
        assert_eq!(row.day_of_month, 5);
        assert_eq!(row.month, 5);
        assert_eq!(row.year, 2024);

        let mut row = row;
        row.set_calendar(at(2024, 5, 6, 9, 0));
        assert_eq!(row.day_of_week, 0);
        assert_eq!(row.value(HOUR), Some(9.0));
        assert_eq!(row.timestamp, at(2024, 5, 5, 17, 45));
    }

    #[test]
    fn test_value_lookup_by_column_name() {
        let mut row = FeatureRow::new(at(2024, 5, 1, 8, 0), 10.0, 40.0);
        row.lags = vec![Some(9.0), None];
        row.rolling = Some(RollingStats {
            mean: 9.5,
            std: 0.5,
        });

        assert_eq!(row.value("free_lag_1"), Some(9.0));
        assert_eq!(row.value("free_lag_2"), None);
        assert_eq!(row.value("free_lag_3"), None);
        assert_eq!(row.value("free_lag_0"), None);
        assert_eq!(row.value(ROLLING_STD), Some(0.5));
        assert_eq!(row.value(OCCUPIED), Some(40.0));
        assert_eq!(row.value("capacity"), None);
    }

    #[test]
    fn test_history_columns() {
        assert!(is_history_column("free_lag_12"));
        assert!(is_history_column(ROLLING_MEAN));
        assert!(!is_history_column(FREE));
        assert!(!is_history_column("free_lag_x"));
        assert_eq!(lag_index(&lag_column(7)), Some(7));
    }
}
