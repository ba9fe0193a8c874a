//! Detection cycle orchestration
//!
//! Each cycle fetches records past the checkpoint, advances and persists
//! the checkpoint, trains the model on first sufficient data, scores the
//! batch and publishes the result document.

mod r#loop;
mod output;

#[cfg(test)]
mod tests;

pub use output::ResultWriter;
pub use r#loop::{WatcherLoop, WatcherLoopBuilder};

use crate::detector::{ModelConfig, OutlierModel};
use crate::models::DetectionResult;
use crate::source::CheckpointStore;
use std::time::Duration;

/// Default delay between cycles
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for the watcher loop
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Sleep between detection cycles (default: 5 seconds)
    pub poll_interval: Duration,
    /// Outlier model hyper-parameters
    pub model: ModelConfig,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            model: ModelConfig::default(),
        }
    }
}

/// Mutable state threaded through every cycle
#[derive(Debug)]
pub struct WatcherState {
    /// Largest record time consumed so far
    pub checkpoint: i64,
    pub model: OutlierModel,
}

impl WatcherState {
    pub fn new(checkpoint: i64, model_config: ModelConfig) -> Self {
        Self {
            checkpoint,
            model: OutlierModel::new(model_config),
        }
    }

    /// Restore the checkpoint from disk; the model always starts untrained
    pub fn load(store: &CheckpointStore, model_config: ModelConfig) -> Self {
        Self::new(store.load(), model_config)
    }

    /// Move the checkpoint forward to `time`; returns false if it would
    /// not increase
    pub fn advance(&mut self, time: i64) -> bool {
        if time > self.checkpoint {
            self.checkpoint = time;
            true
        } else {
            false
        }
    }
}

/// What a single cycle did
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// No records newer than the checkpoint
    Idle,
    /// The metrics log could not be read
    SourceFailed,
    /// A result document was produced for new records
    Published(CycleReport),
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Published(report) => Some(report),
            _ => None,
        }
    }
}

/// Details of a cycle that processed new records
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub result: DetectionResult,
    /// Checkpoint after this cycle
    pub checkpoint: i64,
    pub checkpoint_persisted: bool,
    /// Whether the model was trained when the batch was scored
    pub model_trained: bool,
    pub output_written: bool,
}
