//! Per-cycle result aggregation
//!
//! Turns scored records into [`AnomalyRecord`]s and folds a cycle's records
//! and anomalies into the [`DetectionResult`] document.

use super::model::Scored;
use super::severity::severity;
use crate::models::{
    AnomalyRecord, DetectionResult, DetectionSummary, MetricRecord, ProcessedTimeRange, Severity,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Builds detection results from a cycle's records and anomalies
pub struct ResultAggregator;

impl ResultAggregator {
    /// Collect an [`AnomalyRecord`] for every outlier-labelled record
    ///
    /// `records` and `scored` are parallel; cpu and ram default to 0 when
    /// the reading is absent.
    pub fn anomalies(records: &[MetricRecord], scored: &[Scored]) -> Vec<AnomalyRecord> {
        records
            .iter()
            .zip(scored)
            .filter(|(_, s)| s.is_outlier())
            .map(|(record, s)| AnomalyRecord {
                device: record.device.clone(),
                time: record.time,
                anomaly_score: s.score,
                cpu: record.cpu_util_percent.unwrap_or(0.0),
                ram: record.ram_util_percent.unwrap_or(0.0),
                severity: severity(s.score),
            })
            .collect()
    }

    /// Build the result document stamped with the current time
    pub fn build(records: &[MetricRecord], anomalies: Vec<AnomalyRecord>) -> DetectionResult {
        Self::build_at(records, anomalies, Utc::now())
    }

    /// Build the result document with an explicit generation time
    pub fn build_at(
        records: &[MetricRecord],
        anomalies: Vec<AnomalyRecord>,
        generated_at: DateTime<Utc>,
    ) -> DetectionResult {
        let processed_time_range = ProcessedTimeRange {
            start: records.iter().map(|r| r.time).min().unwrap_or(0),
            end: records.iter().map(|r| r.time).max().unwrap_or(0),
        };

        // Later anomalies for the same device overwrite earlier ones
        let mut affected_devices = BTreeMap::new();
        for anomaly in &anomalies {
            affected_devices.insert(anomaly.device.clone(), anomaly.severity);
        }

        let anomaly_rate = if records.is_empty() {
            0.0
        } else {
            round_percent(100.0 * anomalies.len() as f64 / records.len() as f64)
        };

        let high_severity_count = anomalies
            .iter()
            .filter(|a| a.severity == Severity::High)
            .count();

        DetectionResult {
            timestamp: generated_at,
            processed_time_range,
            total_records_processed: records.len(),
            anomalies_detected: anomalies.len(),
            is_anomaly: !anomalies.is_empty(),
            summary: DetectionSummary {
                anomaly_rate,
                devices_affected: affected_devices.len(),
                high_severity_count,
            },
            affected_devices,
            anomaly_details: anomalies,
        }
    }

    /// Result for a cycle that produced no anomalies
    pub fn empty(records: &[MetricRecord]) -> DetectionResult {
        Self::build(records, Vec::new())
    }
}

/// Round to two decimal places
pub fn round_percent(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
