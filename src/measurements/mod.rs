//! Durable measurement cache: ingestion of raw upstream points, the parquet-backed
//! store and the ledger of fetched windows.

pub mod coverage;
pub mod error;
pub mod ingest;
pub mod store;

pub use store::{MeasurementStore, MergeSummary};
