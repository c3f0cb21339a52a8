//! Repository layer
//!
//! Persistence of job records. Trait-based so services can be exercised
//! against any backing store.

mod record;

pub use record::{FileRecordStore, RecordEntry, RecordScan, RecordStore};
