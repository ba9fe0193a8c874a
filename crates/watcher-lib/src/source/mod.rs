//! Incremental reads from the metrics log
//!
//! This module provides the record source that returns only rows newer than
//! the persisted high-water mark, and the store that persists that mark
//! between runs.

mod checkpoint;
mod csv_log;


pub use checkpoint::CheckpointStore;
pub use csv_log::CsvRecordSource;

use crate::detector::FeatureProjector;
use crate::models::{FeatureVector, MetricRecord};
use anyhow::Result;

pub use async_trait::async_trait;

/// Records newer than a checkpoint, paired with their feature vectors
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    pub records: Vec<MetricRecord>,
    pub features: Vec<FeatureVector>,
}

impl RecordBatch {
    /// Build a batch, projecting each record onto the feature schema
    pub fn from_records(records: Vec<MetricRecord>) -> Self {
        let features = FeatureProjector::project_all(&records);
        Self { records, features }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest `time` in the batch
    pub fn max_time(&self) -> Option<i64> {
        self.records.iter().map(|r| r.time).max()
    }
}

/// Trait for append-only metrics log readers
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Return every record with `time > after`, in log order
    ///
    /// `Ok(None)` means no data: the log is absent, empty, or has nothing
    /// newer than `after`. Errors are reserved for reads that failed.
    async fn fetch(&self, after: i64) -> Result<Option<RecordBatch>>;

    /// Human-readable location of the log, for logging
    fn describe(&self) -> String;
}
