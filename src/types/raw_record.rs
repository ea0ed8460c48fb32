use serde::{Deserialize, Serialize};

/// One raw point as returned by the upstream time-series API.
///
/// Every field is optional because upstream payloads are not trusted: records
/// missing any of them are skipped during ingestion instead of failing the batch.
/// The aliases accept the Open Data Hub flat-endpoint field names directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Measurement time as text, in any of the formats accepted by [`crate::parse_timestamp`].
    #[serde(default, alias = "mvalidtime")]
    pub timestamp: Option<String>,
    /// Metric name, `"free"` or `"occupied"`.
    #[serde(default, alias = "tname")]
    pub metric: Option<String>,
    #[serde(default, alias = "mvalue")]
    pub value: Option<f64>,
}

impl RawRecord {
    pub fn new(timestamp: impl Into<String>, metric: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp: Some(timestamp.into()),
            metric: Some(metric.into()),
            value: Some(value),
        }
    }
}
