//! Result document output
//!
//! The document is replaced wholesale every cycle; it is a snapshot for
//! pollers, not an append log.

use crate::models::DetectionResult;
use crate::persist::write_atomic;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Writes the per-cycle [`DetectionResult`] as pretty-printed JSON
#[derive(Debug, Clone)]
pub struct ResultWriter {
    path: PathBuf,
}

impl ResultWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the output document with `result`
    pub fn write(&self, result: &DetectionResult) -> Result<()> {
        let json = serde_json::to_vec_pretty(result).context("Failed to serialize result")?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("Failed to write result to {}", self.path.display()))
    }

    /// Make sure the output directory exists before the first cycle
    pub fn prepare(&self) -> Result<()> {
        match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::ResultAggregator;
    use tempfile::TempDir;

    #[test]
    fn test_write_pretty_json() {
        let dir = TempDir::new().unwrap();
        let writer = ResultWriter::new(dir.path().join("outputs/anomaly.json"));

        writer.write(&ResultAggregator::empty(&[])).unwrap();

        let raw = std::fs::read_to_string(writer.path()).unwrap();
        assert!(raw.contains("\n  \"total_records_processed\": 0"));
        let parsed: DetectionResult = serde_json::from_str(&raw).unwrap();
        assert!(!parsed.is_anomaly);
    }

    #[test]
    fn test_prepare_creates_directory() {
        let dir = TempDir::new().unwrap();
        let writer = ResultWriter::new(dir.path().join("a/b/anomaly.json"));

        writer.prepare().unwrap();

        assert!(dir.path().join("a/b").is_dir());
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        // parent is a regular file, so the directory cannot be created
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let writer = ResultWriter::new(blocker.join("anomaly.json"));

        assert!(writer.write(&ResultAggregator::empty(&[])).is_err());
    }
}
