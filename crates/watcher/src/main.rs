//! Anomaly Watcher - incremental outlier detection over edge device metrics
//!
//! This binary tails the fleet's append-only metrics log, scores every new
//! record with a lazily trained isolation forest and publishes a result
//! document after each cycle.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use watcher_lib::{
    CheckpointStore, CsvRecordSource, ResultWriter, WatcherConfig, WatcherLoopBuilder,
};

mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let settings = config::WatcherSettings::load()?;
    info!(
        input = %settings.input_path.display(),
        output = %settings.output_path.display(),
        checkpoint = %settings.checkpoint_path.display(),
        poll_interval_secs = settings.poll_interval_secs,
        "Watcher configured"
    );

    let watcher = WatcherLoopBuilder::new()
        .source(Arc::new(CsvRecordSource::new(&settings.input_path)))
        .checkpoint_store(CheckpointStore::new(&settings.checkpoint_path))
        .writer(ResultWriter::new(&settings.output_path))
        .config(WatcherConfig {
            poll_interval: settings.poll_interval(),
            ..Default::default()
        })
        .build()
        .context("Failed to build watcher")?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(watcher.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("SIGINT received, finishing current cycle");
    let _ = shutdown_tx.send(());

    match handle.await {
        Ok(state) => {
            info!(checkpoint = state.checkpoint, "Shutting down");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Watcher task failed");
            Err(e.into())
        }
    }
}
