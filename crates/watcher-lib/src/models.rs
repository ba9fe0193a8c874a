//! Core data models for the anomaly watcher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of numeric features projected from each record
pub const FEATURE_COUNT: usize = 6;

/// One utilization sample reported by an edge device
///
/// Metric fields are `None` when the column is absent from the log or the
/// cell is empty or non-numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub device: String,
    pub time: i64,
    pub vm_count: Option<f64>,
    pub ram_used: Option<f64>,
    pub ram_total: Option<f64>,
    pub ram_util_percent: Option<f64>,
    pub cpu_util_percent: Option<f64>,
    pub energy_consumed: Option<f64>,
}

/// Ordered numeric projection of a [`MetricRecord`]
///
/// Order: vmCount, ramUsed, ramTotal, ramUtilPercent, cpuUtilPercent,
/// energyConsumed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    pub fn get(&self, index: usize) -> f64 {
        self.0[index]
    }
}

/// Discrete severity tier derived from an anomaly score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

/// A record flagged as an outlier during one detection cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub device: String,
    pub time: i64,
    pub anomaly_score: f64,
    pub cpu: f64,
    pub ram: f64,
    pub severity: Severity,
}

/// Inclusive time span covered by a cycle's records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessedTimeRange {
    pub start: i64,
    pub end: i64,
}

/// Summary statistics of a detection cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    /// Percentage of processed records flagged, rounded to two decimals
    pub anomaly_rate: f64,
    pub devices_affected: usize,
    pub high_severity_count: usize,
}

/// Per-cycle output document, overwritten wholesale every cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub timestamp: DateTime<Utc>,
    pub processed_time_range: ProcessedTimeRange,
    pub total_records_processed: usize,
    pub anomalies_detected: usize,
    pub is_anomaly: bool,
    pub affected_devices: BTreeMap<String, Severity>,
    pub anomaly_details: Vec<AnomalyRecord>,
    pub summary: DetectionSummary,
}

/// Persisted high-water mark document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_time: i64,
}
