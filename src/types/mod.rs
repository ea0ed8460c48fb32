pub mod measurement;
pub mod raw_record;
pub mod station;
pub mod timestamp;
