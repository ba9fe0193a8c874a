//! Watcher configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the anomaly watcher
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WatcherSettings {
    /// Append-only CSV metrics log
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,

    /// Per-cycle result document
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Persisted high-water mark
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,

    /// Sleep between detection cycles in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_input_path() -> PathBuf {
    PathBuf::from("data/inputs/edge_metrics.csv")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("data/outputs/anomaly.json")
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("data/outputs/.last_time.json")
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            output_path: default_output_path(),
            checkpoint_path: default_checkpoint_path(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl WatcherSettings {
    /// Load from an optional `watcher.toml` and `WATCHER_*` environment
    /// variables; the environment wins
    pub fn load() -> Result<Self> {
        Self::from_sources(
            config::File::with_name("watcher").required(false),
            None,
        )
    }

    /// Load from an explicit file source and, for tests, an explicit
    /// environment map instead of the process environment
    pub fn from_sources(
        file: config::File<config::FileSourceFile, config::FileFormat>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("WATCHER")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .context("Failed to read watcher configuration")?;

        let settings: Self = config
            .try_deserialize()
            .context("Invalid watcher configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_file(dir: &TempDir) -> config::File<config::FileSourceFile, config::FileFormat> {
        config::File::from(dir.path().join("missing.toml")).required(false)
    }

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = WatcherSettings::from_sources(no_file(&dir), env(&[])).unwrap();

        assert_eq!(settings, WatcherSettings::default());
        assert_eq!(settings.poll_interval(), Duration::from_secs(5));
        assert_eq!(
            settings.input_path,
            PathBuf::from("data/inputs/edge_metrics.csv")
        );
    }

    #[test]
    fn test_environment_overrides() {
        let dir = TempDir::new().unwrap();
        let settings = WatcherSettings::from_sources(
            no_file(&dir),
            env(&[
                ("WATCHER_INPUT_PATH", "/var/lib/fleet/metrics.csv"),
                ("WATCHER_POLL_INTERVAL_SECS", "30"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.input_path, PathBuf::from("/var/lib/fleet/metrics.csv"));
        assert_eq!(settings.poll_interval_secs, 30);
        assert_eq!(settings.output_path, default_output_path());
    }

    #[test]
    fn test_file_then_environment() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("watcher.toml");
        std::fs::write(
            &path,
            "output_path = \"/tmp/out.json\"\npoll_interval_secs = 2\n",
        )
        .unwrap();

        let settings = WatcherSettings::from_sources(
            config::File::from(path),
            env(&[("WATCHER_POLL_INTERVAL_SECS", "7")]),
        )
        .unwrap();

        assert_eq!(settings.output_path, PathBuf::from("/tmp/out.json"));
        assert_eq!(settings.poll_interval_secs, 7);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let dir = TempDir::new().unwrap();
        let result = WatcherSettings::from_sources(
            no_file(&dir),
            env(&[("WATCHER_POLL_INTERVAL_SECS", "0")]),
        );

        assert!(result.is_err());
    }
}
