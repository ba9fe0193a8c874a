//! Structured logging for watcher events
//!
//! Every significant transition of a detection cycle is logged with an
//! `event` field so the JSON log stream can be filtered per event type.

use crate::models::{AnomalyRecord, DetectionResult, Severity};
use tracing::{error, info, warn};

/// Structured logger for watcher events
#[derive(Clone)]
pub struct StructuredLogger {
    source: String,
}

impl StructuredLogger {
    /// `source` identifies the metrics log being watched
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Log watcher startup
    pub fn log_startup(&self, version: &str, output: &str, checkpoint: i64, interval_secs: f64) {
        info!(
            event = "watcher_started",
            source = %self.source,
            watcher_version = %version,
            output = %output,
            checkpoint = checkpoint,
            interval_secs = interval_secs,
            "Starting real-time anomaly monitoring"
        );
    }

    pub fn log_no_new_metrics(&self, checkpoint: i64) {
        info!(
            event = "no_new_metrics",
            source = %self.source,
            checkpoint = checkpoint,
            "No new metrics, sleeping"
        );
    }

    pub fn log_source_failure(&self, error: &anyhow::Error) {
        warn!(
            event = "source_read_failed",
            source = %self.source,
            error = %format!("{error:#}"),
            "Failed to read metrics log"
        );
    }

    /// Log advancement of the high-water mark
    pub fn log_checkpoint_advanced(&self, from: i64, to: i64, records: usize, persisted: bool) {
        if persisted {
            info!(
                event = "checkpoint_advanced",
                source = %self.source,
                from = from,
                to = to,
                records = records,
                "Checkpoint advanced"
            );
        } else {
            warn!(
                event = "checkpoint_advanced",
                source = %self.source,
                from = from,
                to = to,
                records = records,
                persisted = false,
                "Checkpoint advanced in memory only"
            );
        }
    }

    pub fn log_model_trained(&self, scorer: &str, samples: usize) {
        info!(
            event = "model_trained",
            source = %self.source,
            scorer = %scorer,
            samples = samples,
            "Outlier model trained"
        );
    }

    pub fn log_insufficient_training_data(&self, samples: usize, required: usize) {
        warn!(
            event = "insufficient_training_data",
            source = %self.source,
            samples = samples,
            required = required,
            "Not enough data to train, publishing empty result"
        );
    }

    /// Log a single detected anomaly; HIGH severity logs at warn
    pub fn log_anomaly(&self, anomaly: &AnomalyRecord) {
        match anomaly.severity {
            Severity::High => {
                warn!(
                    event = "anomaly_detected",
                    source = %self.source,
                    device = %anomaly.device,
                    time = anomaly.time,
                    anomaly_score = anomaly.anomaly_score,
                    cpu = anomaly.cpu,
                    ram = anomaly.ram,
                    severity = %anomaly.severity,
                    "High severity anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    source = %self.source,
                    device = %anomaly.device,
                    time = anomaly.time,
                    anomaly_score = anomaly.anomaly_score,
                    cpu = anomaly.cpu,
                    ram = anomaly.ram,
                    severity = %anomaly.severity,
                    "Anomaly detected"
                );
            }
        }
    }

    pub fn log_result_published(&self, result: &DetectionResult, output: &str) {
        info!(
            event = "result_published",
            source = %self.source,
            output = %output,
            records = result.total_records_processed,
            anomalies = result.anomalies_detected,
            anomaly_rate = result.summary.anomaly_rate,
            high_severity = result.summary.high_severity_count,
            range_start = result.processed_time_range.start,
            range_end = result.processed_time_range.end,
            "Result written"
        );
    }

    pub fn log_result_write_failed(&self, output: &str, error: &anyhow::Error) {
        error!(
            event = "result_write_failed",
            source = %self.source,
            output = %output,
            error = %format!("{error:#}"),
            "Failed to write result, will retry next cycle"
        );
    }

    pub fn log_shutdown(&self, reason: &str, cycles: u64) {
        info!(
            event = "watcher_shutdown",
            source = %self.source,
            reason = %reason,
            cycles = cycles,
            "Anomaly watcher shutting down"
        );
    }
}
