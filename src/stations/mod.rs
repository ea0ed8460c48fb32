pub mod catalog;
pub mod error;

pub use catalog::StationCatalog;
