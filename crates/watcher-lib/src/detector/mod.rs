//! Outlier detection for device utilization records
//!
//! This module provides:
//! - Feature projection onto the fixed utilization schema
//! - A lazily trained outlier model (standard scaler + isolation forest)
//! - Severity classification of anomaly scores
//! - Aggregation of a cycle's anomalies into the result document

mod aggregator;
mod features;
mod isolation_forest;
mod model;
mod scaler;
mod severity;

pub use aggregator::{round_percent, ResultAggregator};
pub use features::{FeatureProjector, FEATURE_COLUMNS};
pub use isolation_forest::{average_path_length, IsolationForest};
pub use model::{
    Label, ModelConfig, ModelError, ModelState, OutlierModel, OutlierScorer, Scored,
    MIN_TRAINING_SAMPLES,
};
pub use scaler::StandardScaler;
pub use severity::{severity, HIGH_SEVERITY_THRESHOLD, MEDIUM_SEVERITY_THRESHOLD};
