//! Feature projection for outlier scoring
//!
//! Maps each metric record onto the fixed numeric schema the model is
//! trained on. Missing values default to zero.

use crate::models::{FeatureVector, MetricRecord, FEATURE_COUNT};

/// Column names of the feature schema, in vector order
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "vmCount",
    "ramUsed",
    "ramTotal",
    "ramUtilPercent",
    "cpuUtilPercent",
    "energyConsumed",
];

/// Projects raw records onto [`FeatureVector`]s
pub struct FeatureProjector;

impl FeatureProjector {
    pub fn project(record: &MetricRecord) -> FeatureVector {
        FeatureVector::new([
            record.vm_count.unwrap_or(0.0),
            record.ram_used.unwrap_or(0.0),
            record.ram_total.unwrap_or(0.0),
            record.ram_util_percent.unwrap_or(0.0),
            record.cpu_util_percent.unwrap_or(0.0),
            record.energy_consumed.unwrap_or(0.0),
        ])
    }

    pub fn project_all(records: &[MetricRecord]) -> Vec<FeatureVector> {
        records.iter().map(Self::project).collect()
    }
}
