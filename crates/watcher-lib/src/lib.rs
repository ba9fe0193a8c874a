//! Incremental anomaly detection for edge device utilization logs
//!
//! This crate provides the core functionality for:
//! - Reading new rows from an append-only metrics log past a persisted checkpoint
//! - Feature projection and one-time training of an outlier model
//! - Severity classification and per-cycle result aggregation
//! - The polling loop that ties the cycle together
//! - Structured logging of watcher events

pub mod detector;
pub mod models;
pub mod observability;
pub mod persist;
pub mod source;
pub mod watcher;

pub use detector::{
    severity, FeatureProjector, IsolationForest, ModelConfig, ModelError, OutlierModel,
    ResultAggregator,
};
pub use models::*;
pub use observability::StructuredLogger;
pub use source::{CheckpointStore, CsvRecordSource, RecordBatch, RecordSource};
pub use watcher::{
    CycleOutcome, CycleReport, ResultWriter, WatcherConfig, WatcherLoop, WatcherLoopBuilder,
    WatcherState,
};
