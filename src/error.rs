use crate::config::ConfigurationError;
use crate::forecast::error::{DataError, ModelError};
use crate::measurements::error::StoreError;
use crate::source::error::SourceError;
use crate::stations::error::StationCatalogError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParkingForecastError>;

#[derive(Debug, Error)]
pub enum ParkingForecastError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    StationCatalog(#[from] StationCatalogError),

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine cache directory")]
    CacheDirResolution,
}
