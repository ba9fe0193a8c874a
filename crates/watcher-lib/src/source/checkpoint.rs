//! High-water mark persistence
//!
//! The checkpoint is the single durable value the watcher owns: the largest
//! `time` among all records already consumed. It is stored as
//! `{"last_time": <integer>}`.

use crate::models::Checkpoint;
use crate::persist::write_atomic;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File-backed store for the processed-records checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted checkpoint
    ///
    /// Returns 0 when no checkpoint exists or it cannot be read or parsed;
    /// the caller then reprocesses the log from the start.
    pub fn load(&self) -> i64 {
        let content = match std::fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No checkpoint found, starting from 0");
                return 0;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read checkpoint, starting from 0");
                return 0;
            }
        };

        match Self::parse(&content) {
            Some(last_time) => last_time,
            None => {
                warn!(path = %self.path.display(), "Corrupt checkpoint, starting from 0");
                0
            }
        }
    }

    /// Overwrite the persisted checkpoint
    pub fn save(&self, last_time: i64) -> Result<()> {
        let json = serde_json::to_vec(&Checkpoint { last_time })
            .context("Failed to serialize checkpoint")?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("Failed to save checkpoint to {}", self.path.display()))
    }

    /// Extract `last_time` from a checkpoint document
    ///
    /// A document without the key holds 0; a non-numeric value is corrupt.
    fn parse(content: &[u8]) -> Option<i64> {
        let value: serde_json::Value = serde_json::from_slice(content).ok()?;
        let object = value.as_object()?;

        match object.get("last_time") {
            None => Some(0),
            Some(last_time) => last_time
                .as_i64()
                .or_else(|| last_time.as_f64().filter(|t| t.is_finite()).map(|t| t as i64)),
        }
    }
}
