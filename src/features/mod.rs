//! Feature engineering: turns a measurement [`Series`](crate::Series) into a supervised
//! learning table with calendar, lag, rate-of-change and rolling features.

pub mod builder;
pub mod table;

pub use builder::FeatureBuilder;
pub use table::{FeatureRow, FeatureTable, RollingStats, SupervisedSet};
