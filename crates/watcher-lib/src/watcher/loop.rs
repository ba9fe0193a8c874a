//! Watcher polling loop
//!
//! Runs detection cycles on a fixed interval until a shutdown message
//! arrives. A cycle in progress always completes; only the sleep between
//! cycles is cancellable.

use super::{CycleOutcome, CycleReport, ResultWriter, WatcherConfig, WatcherState};
use crate::detector::ResultAggregator;
use crate::models::DetectionResult;
use crate::observability::StructuredLogger;
use crate::source::{CheckpointStore, RecordBatch, RecordSource};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Incremental anomaly detection loop over a record source
pub struct WatcherLoop {
    source: Arc<dyn RecordSource>,
    checkpoint_store: CheckpointStore,
    writer: ResultWriter,
    config: WatcherConfig,
    state: WatcherState,
    logger: StructuredLogger,
    cycle_count: u64,
}

impl WatcherLoop {
    /// Create a loop, restoring the checkpoint from `checkpoint_store`
    pub fn new(
        source: Arc<dyn RecordSource>,
        checkpoint_store: CheckpointStore,
        writer: ResultWriter,
        config: WatcherConfig,
    ) -> Self {
        let state = WatcherState::load(&checkpoint_store, config.model.clone());
        let logger = StructuredLogger::new(source.describe());

        Self {
            source,
            checkpoint_store,
            writer,
            config,
            state,
            logger,
            cycle_count: 0,
        }
    }

    pub fn state(&self) -> &WatcherState {
        &self.state
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Run cycles until `shutdown` fires or its sender is dropped
    ///
    /// Returns the final state so callers can inspect it after shutdown.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> WatcherState {
        if let Err(e) = self.writer.prepare() {
            warn!(error = %format!("{e:#}"), "Failed to prepare output directory");
        }

        self.logger.log_startup(
            env!("CARGO_PKG_VERSION"),
            &self.writer.path().display().to_string(),
            self.state.checkpoint,
            self.config.poll_interval.as_secs_f64(),
        );

        loop {
            let outcome = self.run_cycle().await;
            debug!(cycle = self.cycle_count, outcome = %outcome_kind(&outcome), "Cycle complete");

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.recv() => {
                    self.logger.log_shutdown("shutdown signal received", self.cycle_count);
                    break;
                }
            }
        }

        self.state
    }

    /// Execute one detection cycle: fetch, checkpoint, train or score,
    /// aggregate, publish
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycle_count += 1;
        let previous = self.state.checkpoint;

        let batch = match self.source.fetch(previous).await {
            Ok(Some(batch)) if !batch.is_empty() => batch,
            Ok(_) => {
                self.logger.log_no_new_metrics(previous);
                return CycleOutcome::Idle;
            }
            Err(e) => {
                self.logger.log_source_failure(&e);
                return CycleOutcome::SourceFailed;
            }
        };

        // Checkpoint is persisted before scoring: a crash after this point
        // loses this batch's detections rather than reprocessing it.
        let checkpoint_persisted = self.advance_checkpoint(previous, &batch);

        let (result, model_trained) = self.detect(&batch);

        let output_written = match self.writer.write(&result) {
            Ok(()) => {
                self.logger
                    .log_result_published(&result, &self.writer.path().display().to_string());
                true
            }
            Err(e) => {
                self.logger
                    .log_result_write_failed(&self.writer.path().display().to_string(), &e);
                false
            }
        };

        CycleOutcome::Published(CycleReport {
            result,
            checkpoint: self.state.checkpoint,
            checkpoint_persisted,
            model_trained,
            output_written,
        })
    }

    /// Advance the in-memory checkpoint to the batch maximum and persist it
    fn advance_checkpoint(&mut self, previous: i64, batch: &RecordBatch) -> bool {
        let Some(max_time) = batch.max_time() else {
            return true;
        };
        if !self.state.advance(max_time) {
            return true;
        }

        let persisted = match self.checkpoint_store.save(self.state.checkpoint) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    path = %self.checkpoint_store.path().display(),
                    error = %format!("{e:#}"),
                    "Failed to persist checkpoint"
                );
                false
            }
        };

        self.logger
            .log_checkpoint_advanced(previous, self.state.checkpoint, batch.len(), persisted);
        persisted
    }

    /// Train on first sufficient data, then score the batch
    fn detect(&mut self, batch: &RecordBatch) -> (DetectionResult, bool) {
        let model = &mut self.state.model;

        if !model.is_trained() {
            if !model.maybe_train(&batch.features) {
                self.logger.log_insufficient_training_data(
                    batch.len(),
                    model.config().min_training_samples,
                );
                return (ResultAggregator::empty(&batch.records), false);
            }
            self.logger
                .log_model_trained(model.scorer_name().unwrap_or("unknown"), batch.len());
        }

        let scored = match model.score(&batch.features) {
            Ok(scored) => scored,
            Err(e) => {
                warn!(error = %e, "Scoring failed, publishing empty result");
                return (ResultAggregator::empty(&batch.records), false);
            }
        };

        let anomalies = ResultAggregator::anomalies(&batch.records, &scored);
        for anomaly in &anomalies {
            self.logger.log_anomaly(anomaly);
        }

        (ResultAggregator::build(&batch.records, anomalies), true)
    }
}

fn outcome_kind(outcome: &CycleOutcome) -> &'static str {
    match outcome {
        CycleOutcome::Idle => "idle",
        CycleOutcome::SourceFailed => "source_failed",
        CycleOutcome::Published(_) => "published",
    }
}

/// Builder for creating the watcher loop
pub struct WatcherLoopBuilder {
    source: Option<Arc<dyn RecordSource>>,
    checkpoint_store: Option<CheckpointStore>,
    writer: Option<ResultWriter>,
    config: WatcherConfig,
}

impl WatcherLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            source: None,
            checkpoint_store: None,
            writer: None,
            config: WatcherConfig::default(),
        }
    }

    /// Set the record source
    pub fn source(mut self, source: Arc<dyn RecordSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the checkpoint store
    pub fn checkpoint_store(mut self, store: CheckpointStore) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    /// Set the result writer
    pub fn writer(mut self, writer: ResultWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Set the poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the full configuration
    pub fn config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the watcher loop
    pub fn build(self) -> Result<WatcherLoop> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Record source is required"))?;
        let checkpoint_store = self
            .checkpoint_store
            .ok_or_else(|| anyhow::anyhow!("Checkpoint store is required"))?;
        let writer = self
            .writer
            .ok_or_else(|| anyhow::anyhow!("Result writer is required"))?;

        if self.config.poll_interval.is_zero() {
            anyhow::bail!("Poll interval must be greater than zero");
        }
        self.config.model.validate()?;

        let watcher = WatcherLoop::new(source, checkpoint_store, writer, self.config);
        info!(
            checkpoint = watcher.state.checkpoint,
            "Watcher state restored"
        );
        Ok(watcher)
    }
}

impl Default for WatcherLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
