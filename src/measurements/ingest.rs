//! Turns raw `{timestamp, metric, value}` points into [`Measurement`]s.
//!
//! Upstream returns one point per metric, so a single observation arrives as two
//! records (`free` and `occupied`) sharing a timestamp. Records are grouped by
//! parsed timestamp in fixed-size chunks on the rayon pool; chunk results are
//! folded in chunk order, metric by metric, which gives exactly the result of a
//! sequential pass over the batch.

use crate::config::IngestConfig;
use crate::types::measurement::Measurement;
use crate::types::raw_record::RawRecord;
use crate::types::timestamp::parse_timestamp;
use chrono::NaiveDateTime;
use log::debug;
use rayon::prelude::*;
use std::collections::BTreeMap;

pub const FREE_METRIC: &str = "free";
pub const OCCUPIED_METRIC: &str = "occupied";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PartialCounts {
    free: Option<u32>,
    occupied: Option<u32>,
    records: usize,
}

impl PartialCounts {
    fn absorb(&mut self, later: PartialCounts) {
        if later.free.is_some() {
            self.free = later.free;
        }
        if later.occupied.is_some() {
            self.occupied = later.occupied;
        }
        self.records += later.records;
    }

    fn complete(&self) -> Option<(u32, u32)> {
        Some((self.free?, self.occupied?))
    }
}

#[derive(Debug, Default)]
struct ChunkGroups {
    counts: BTreeMap<NaiveDateTime, PartialCounts>,
    skipped: usize,
}

/// Outcome of one ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Raw records received.
    pub records: usize,
    /// Records dropped because a field was missing or unusable, or because their
    /// timestamp never reported both metrics.
    pub skipped: usize,
    /// Measurements produced (one per distinct timestamp).
    pub measurements: usize,
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    chunk_size: usize,
}

impl Ingestor {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
        }
    }

    /// Groups `records` into measurements for `station_code`, sorted by timestamp.
    ///
    /// A timestamp that only ever reported one of the two metrics is dropped along
    /// with its records.
    pub fn ingest(
        &self,
        station_code: &str,
        records: &[RawRecord],
    ) -> (Vec<Measurement>, IngestSummary) {
        let chunks: Vec<ChunkGroups> = records
            .par_chunks(self.chunk_size)
            .map(group_chunk)
            .collect();

        let mut grouped: BTreeMap<NaiveDateTime, PartialCounts> = BTreeMap::new();
        let mut skipped = 0;
        for chunk in chunks {
            skipped += chunk.skipped;
            for (timestamp, counts) in chunk.counts {
                grouped.entry(timestamp).or_default().absorb(counts);
            }
        }

        let mut measurements = Vec::with_capacity(grouped.len());
        for (timestamp, counts) in grouped {
            match counts.complete() {
                Some((free, occupied)) => {
                    measurements.push(Measurement::new(station_code, timestamp, free, occupied));
                }
                None => {
                    debug!("Dropping half-observed timestamp {timestamp} for station {station_code}");
                    skipped += counts.records;
                }
            }
        }

        let summary = IngestSummary {
            records: records.len(),
            skipped,
            measurements: measurements.len(),
        };
        debug!(
            "Ingested {} raw records for station {} into {} measurements ({} skipped)",
            summary.records, station_code, summary.measurements, summary.skipped
        );
        (measurements, summary)
    }
}

fn group_chunk(chunk: &[RawRecord]) -> ChunkGroups {
    let mut groups = ChunkGroups::default();
    for record in chunk {
        match parse_record(record) {
            Some((timestamp, counts)) => {
                groups.counts.entry(timestamp).or_default().absorb(counts);
            }
            None => groups.skipped += 1,
        }
    }
    groups
}

fn parse_record(record: &RawRecord) -> Option<(NaiveDateTime, PartialCounts)> {
    let timestamp = parse_timestamp(record.timestamp.as_deref()?)?;
    let value = record.value?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return None;
    }
    let count = value as u32;
    let counts = match record.metric.as_deref()? {
        FREE_METRIC => PartialCounts {
            free: Some(count),
            occupied: None,
            records: 1,
        },
        OCCUPIED_METRIC => PartialCounts {
            free: None,
            occupied: Some(count),
            records: 1,
        },
        _ => return None,
    };
    Some((timestamp, counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn ingestor(chunk_size: usize) -> Ingestor {
        Ingestor::new(&IngestConfig { chunk_size })
    }

    #[test]
    fn test_pairs_metrics_by_timestamp() {
        let records = vec![
            RawRecord::new("2024-05-01 08:05:00.000+0000", "occupied", 30.0),
            RawRecord::new("2024-05-01 08:00:00.000+0000", "free", 12.0),
            RawRecord::new("2024-05-01T08:00:00Z", "occupied", 28.0),
            RawRecord::new("2024-05-01 08:05:00.000+0000", "free", 10.0),
        ];

        let (measurements, summary) = ingestor(1000).ingest("103", &records);

        assert_eq!(
            measurements,
            vec![
                Measurement::new("103", at(8, 0), 12, 28),
                Measurement::new("103", at(8, 5), 10, 30),
            ]
        );
        assert_eq!(
            summary,
            IngestSummary {
                records: 4,
                skipped: 0,
                measurements: 2
            }
        );
    }

    #[test]
    fn test_malformed_records_are_skipped_individually() {
        let records = vec![
            RawRecord::new("2024-05-01 08:00:00", "free", 5.0),
            RawRecord::new("2024-05-01 08:00:00", "occupied", 45.0),
            RawRecord {
                timestamp: None,
                metric: Some("free".into()),
                value: Some(1.0),
            },
            RawRecord {
                timestamp: Some("2024-05-01 08:10:00".into()),
                metric: None,
                value: Some(1.0),
            },
            RawRecord {
                timestamp: Some("2024-05-01 08:15:00".into()),
                metric: Some("free".into()),
                value: None,
            },
            RawRecord::new("not a time", "free", 1.0),
            RawRecord::new("2024-05-01 08:20:00", "free", -1.0),
            RawRecord::new("2024-05-01 08:25:00", "free", 2.5),
            RawRecord::new("2024-05-01 08:30:00", "capacity", 100.0),
        ];

        let (measurements, summary) = ingestor(3).ingest("103", &records);

        assert_eq!(measurements, vec![Measurement::new("103", at(8, 0), 5, 45)]);
        assert_eq!(summary.skipped, 7);
        assert_eq!(summary.records, 9);
    }

    #[test]
    fn test_half_observed_timestamps_are_dropped() {
        let records = vec![
            RawRecord::new("2024-05-01 08:00:00", "occupied", 30.0),
            RawRecord::new("2024-05-01 08:05:00", "free", 20.0),
            RawRecord::new("2024-05-01 08:05:00", "free", 21.0),
            RawRecord::new("2024-05-01 08:10:00", "free", 19.0),
            RawRecord::new("2024-05-01 08:10:00", "occupied", 31.0),
        ];

        for chunk_size in [1, 2, 1000] {
            let (measurements, summary) = ingestor(chunk_size).ingest("103", &records);
            assert_eq!(measurements, vec![Measurement::new("103", at(8, 10), 19, 31)]);
            assert_eq!(
                summary,
                IngestSummary {
                    records: 5,
                    skipped: 3,
                    measurements: 1
                }
            );
        }
    }

    #[test]
    fn test_chunked_grouping_matches_sequential() {
        let mut records = Vec::new();
        for i in 0..250u32 {
            let minute = i % 60;
            let hour = 8 + (i / 60) % 3;
            let ts = format!("2024-05-01 {hour:02}:{minute:02}:00");
            records.push(RawRecord::new(ts.clone(), "free", f64::from(i)));
            if i % 3 != 0 {
                records.push(RawRecord::new(ts, "occupied", f64::from(i * 2)));
            }
        }

        let (sequential, expected) = ingestor(usize::MAX).ingest("9", &records);
        assert!(expected.skipped > 0);
        for chunk_size in [1, 2, 7, 64] {
            let (chunked, summary) = ingestor(chunk_size).ingest("9", &records);
            assert_eq!(chunked, sequential, "chunk size {chunk_size} diverged");
            assert_eq!(summary, expected);
        }
    }

    #[test]
    fn test_later_records_override_earlier_ones_across_chunks() {
        let records = vec![
            RawRecord::new("2024-05-01 08:00:00", "free", 1.0),
            RawRecord::new("2024-05-01 08:00:00", "occupied", 9.0),
            RawRecord::new("2024-05-01 08:00:00", "free", 2.0),
        ];

        let (measurements, _) = ingestor(2).ingest("1", &records);
        assert_eq!(measurements, vec![Measurement::new("1", at(8, 0), 2, 9)]);
    }
}
