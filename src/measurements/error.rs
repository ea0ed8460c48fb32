use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create store directory '{0}'")]
    StoreDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to create temporary file in '{0}'")]
    TempFile(PathBuf, #[source] std::io::Error),

    #[error("Encoding error writing parquet cache file '{0}'")]
    ParquetWrite(PathBuf, #[source] PolarsError),

    #[error("Failed to scan parquet cache file '{0}'")]
    ParquetScan(PathBuf, #[source] PolarsError),

    #[error("Failed to atomically replace '{0}'")]
    Persist(PathBuf, #[source] std::io::Error),

    #[error("Failed to read coverage ledger '{0}'")]
    CoverageRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to decode coverage ledger '{0}'")]
    CoverageDecode(PathBuf, #[source] serde_json::Error),

    #[error("Failed to encode coverage ledger")]
    CoverageEncode(#[source] serde_json::Error),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),

    #[error("Malformed cached row {row} in '{path}': {message}")]
    MalformedRow {
        path: PathBuf,
        row: usize,
        message: String,
    },
}
