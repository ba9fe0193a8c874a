//! Cycle-level tests for the watcher loop
//!
//! CSV-backed tests drive full cycles against a temporary data directory;
//! scripted-source tests cover failure paths without touching the log.

#[cfg(test)]
mod cycle_tests {
    use crate::detector::ModelConfig;
    use crate::models::{DetectionResult, MetricRecord, Severity};
    use crate::source::{CheckpointStore, CsvRecordSource, RecordBatch, RecordSource};
    use crate::watcher::{
        CycleOutcome, ResultWriter, WatcherConfig, WatcherLoop, WatcherLoopBuilder, WatcherState,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    const HEADER: &str =
        "device,time,vmCount,ramUsed,ramTotal,ramUtilPercent,cpuUtilPercent,energyConsumed\n";

    struct Fixture {
        _dir: TempDir,
        input: PathBuf,
        output: PathBuf,
        checkpoint: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            Self {
                input: dir.path().join("inputs/edge_metrics.csv"),
                output: dir.path().join("outputs/anomaly.json"),
                checkpoint: dir.path().join("outputs/.last_time.json"),
                _dir: dir,
            }
        }

        fn append(&self, rows: &[String]) {
            std::fs::create_dir_all(self.input.parent().unwrap()).unwrap();
            let mut content = std::fs::read_to_string(&self.input).unwrap_or_default();
            if content.is_empty() {
                content.push_str(HEADER);
            }
            for r in rows {
                content.push_str(r);
            }
            std::fs::write(&self.input, content).unwrap();
        }

        fn watcher(&self) -> WatcherLoop {
            watcher_with_output(self, &self.output)
        }

        fn published(&self) -> DetectionResult {
            let raw = std::fs::read_to_string(&self.output).unwrap();
            serde_json::from_str(&raw).unwrap()
        }
    }

    fn watcher_with_output(fixture: &Fixture, output: &Path) -> WatcherLoop {
        WatcherLoopBuilder::new()
            .source(Arc::new(CsvRecordSource::new(&fixture.input)))
            .checkpoint_store(CheckpointStore::new(&fixture.checkpoint))
            .writer(ResultWriter::new(output))
            .poll_interval(Duration::from_millis(10))
            .build()
            .unwrap()
    }

    fn baseline(time: i64) -> String {
        format!("fog-0,{time},2,1.0,2.0,50.0,40.0,1.2\n")
    }

    fn spike(time: i64) -> String {
        format!("fog-0,{time},2,1.96,2.0,98.0,99.0,1.2\n")
    }

    fn record(time: i64) -> MetricRecord {
        MetricRecord {
            device: "cam-1".to_string(),
            time,
            vm_count: Some(1.0),
            ram_used: Some(1.0),
            ram_total: Some(4.0),
            ram_util_percent: Some(25.0),
            cpu_util_percent: Some(30.0),
            energy_consumed: Some(0.8),
        }
    }

    /// Source that replays a fixed script of fetch results
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Option<RecordBatch>>>>,
        seen: Mutex<Vec<i64>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Option<RecordBatch>>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RecordSource for ScriptedSource {
        async fn fetch(&self, after: i64) -> Result<Option<RecordBatch>> {
            self.seen.lock().unwrap().push(after);
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    #[tokio::test]
    async fn test_first_batch_trains_and_flags_spike() {
        let fixture = Fixture::new();
        let mut rows: Vec<String> = (1..=10).map(baseline).collect();
        rows.push(spike(11));
        fixture.append(&rows);

        let mut watcher = fixture.watcher();
        let outcome = watcher.run_cycle().await;

        let report = outcome.report().expect("cycle should publish");
        assert!(report.model_trained);
        assert!(report.output_written);
        assert_eq!(report.checkpoint, 11);

        let result = fixture.published();
        assert_eq!(result.total_records_processed, 11);
        assert_eq!(result.anomalies_detected, 1);
        assert!(result.is_anomaly);
        assert_eq!(result.processed_time_range.start, 1);
        assert_eq!(result.processed_time_range.end, 11);

        let detail = &result.anomaly_details[0];
        assert_eq!(detail.device, "fog-0");
        assert_eq!(detail.time, 11);
        assert_eq!(detail.cpu, 99.0);
        assert_eq!(detail.ram, 98.0);
        assert!(detail.anomaly_score < 0.0);
        assert!(detail.severity >= Severity::Medium);
        assert_eq!(result.affected_devices.get("fog-0"), Some(&detail.severity));
        assert_eq!(result.summary.devices_affected, 1);
        assert_eq!(result.summary.anomaly_rate, 9.09);
    }

    #[tokio::test]
    async fn test_trained_model_scores_later_batches() {
        let fixture = Fixture::new();
        let mut rows: Vec<String> = (1..=10).map(baseline).collect();
        rows.push(spike(11));
        fixture.append(&rows);

        let mut watcher = fixture.watcher();
        watcher.run_cycle().await;

        fixture.append(&[baseline(12), baseline(13)]);
        let outcome = watcher.run_cycle().await;

        let report = outcome.report().unwrap();
        assert!(report.model_trained);
        assert_eq!(report.result.total_records_processed, 2);
        assert_eq!(report.result.anomalies_detected, 0);
        assert!(!fixture.published().is_anomaly);
    }

    #[tokio::test]
    async fn test_insufficient_training_data_publishes_empty_result() {
        let fixture = Fixture::new();
        fixture.append(&(1..=5).map(baseline).collect::<Vec<_>>());

        let mut watcher = fixture.watcher();
        let outcome = watcher.run_cycle().await;

        let report = outcome.report().unwrap();
        assert!(!report.model_trained);
        assert!(!watcher.state().model.is_trained());

        let result = fixture.published();
        assert!(!result.is_anomaly);
        assert_eq!(result.anomalies_detected, 0);
        assert_eq!(result.total_records_processed, 5);
        assert_eq!(result.summary.anomaly_rate, 0.0);

        // Those records are consumed even though nothing was scored
        assert_eq!(watcher.state().checkpoint, 5);
        assert_eq!(CheckpointStore::new(&fixture.checkpoint).load(), 5);
    }

    #[tokio::test]
    async fn test_missing_log_is_idle() {
        let fixture = Fixture::new();
        let mut watcher = fixture.watcher();

        assert!(matches!(watcher.run_cycle().await, CycleOutcome::Idle));
        assert!(!fixture.output.exists());
        assert_eq!(watcher.state().checkpoint, 0);
    }

    #[tokio::test]
    async fn test_no_new_records_is_idle() {
        let fixture = Fixture::new();
        fixture.append(&(1..=3).map(baseline).collect::<Vec<_>>());

        let mut watcher = fixture.watcher();
        assert!(watcher.run_cycle().await.report().is_some());
        assert!(matches!(watcher.run_cycle().await, CycleOutcome::Idle));
        assert_eq!(watcher.cycle_count(), 2);
    }

    #[tokio::test]
    async fn test_checkpoint_restored_after_restart() {
        let fixture = Fixture::new();
        fixture.append(&(1..=4).map(baseline).collect::<Vec<_>>());

        let mut first = fixture.watcher();
        first.run_cycle().await;
        drop(first);

        let raw = std::fs::read_to_string(&fixture.checkpoint).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["last_time"], 4);

        let mut restarted = fixture.watcher();
        assert_eq!(restarted.state().checkpoint, 4);
        assert!(!restarted.state().model.is_trained());
        assert!(matches!(restarted.run_cycle().await, CycleOutcome::Idle));
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_the_loop() {
        let fixture = Fixture::new();
        fixture.append(&(1..=3).map(baseline).collect::<Vec<_>>());

        let blocker = fixture.output.parent().unwrap().join("blocker");
        std::fs::create_dir_all(blocker.parent().unwrap()).unwrap();
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut watcher = watcher_with_output(&fixture, &blocker.join("anomaly.json"));
        let report = watcher.run_cycle().await.report().cloned().unwrap();

        assert!(!report.output_written);
        // The checkpoint is still advanced; the batch is not retried
        assert_eq!(report.checkpoint, 3);
        assert!(report.checkpoint_persisted);

        fixture.append(&[baseline(4)]);
        let next = watcher.run_cycle().await.report().cloned().unwrap();
        assert_eq!(next.result.total_records_processed, 1);
    }

    #[tokio::test]
    async fn test_checkpoint_save_failure_still_advances_in_memory() {
        let fixture = Fixture::new();
        fixture.append(&[baseline(1), baseline(2)]);

        let blocker = fixture.checkpoint.parent().unwrap().join("blocker");
        std::fs::create_dir_all(blocker.parent().unwrap()).unwrap();
        std::fs::write(&blocker, b"not a directory").unwrap();
        let store = CheckpointStore::new(blocker.join(".last_time.json"));

        let mut watcher = WatcherLoopBuilder::new()
            .source(Arc::new(CsvRecordSource::new(&fixture.input)))
            .checkpoint_store(store.clone())
            .writer(ResultWriter::new(&fixture.output))
            .build()
            .unwrap();

        let report = watcher.run_cycle().await.report().cloned().unwrap();
        assert!(!report.checkpoint_persisted);
        assert_eq!(report.checkpoint, 2);
        assert!(report.output_written);
        assert_eq!(store.load(), 0);

        // Same records are not fetched again within this process
        assert!(matches!(watcher.run_cycle().await, CycleOutcome::Idle));
        assert_eq!(watcher.state().checkpoint, 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_idle() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new(vec![Ok(Some(
            RecordBatch::from_records(Vec::new()),
        ))]));

        let mut watcher = WatcherLoop::new(
            source,
            CheckpointStore::new(dir.path().join(".last_time.json")),
            ResultWriter::new(dir.path().join("anomaly.json")),
            WatcherConfig::default(),
        );

        assert!(matches!(watcher.run_cycle().await, CycleOutcome::Idle));
        assert!(!dir.path().join("anomaly.json").exists());
    }

    #[tokio::test]
    async fn test_source_failure_keeps_checkpoint() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new(vec![
            Err(anyhow::anyhow!("permission denied")),
            Ok(Some(RecordBatch::from_records(vec![record(7), record(9)]))),
        ]));

        let mut watcher = WatcherLoop::new(
            source.clone(),
            CheckpointStore::new(dir.path().join(".last_time.json")),
            ResultWriter::new(dir.path().join("anomaly.json")),
            WatcherConfig::default(),
        );

        assert!(matches!(watcher.run_cycle().await, CycleOutcome::SourceFailed));
        assert_eq!(watcher.state().checkpoint, 0);

        let report = watcher.run_cycle().await.report().cloned().unwrap();
        assert_eq!(report.checkpoint, 9);
        assert_eq!(*source.seen.lock().unwrap(), vec![0, 0]);
    }

    #[tokio::test]
    async fn test_checkpoint_never_moves_backwards() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join(".last_time.json"));
        store.save(100).unwrap();

        let source = Arc::new(ScriptedSource::new(vec![Ok(Some(
            RecordBatch::from_records(vec![record(50)]),
        ))]));
        let mut watcher = WatcherLoop::new(
            source,
            store.clone(),
            ResultWriter::new(dir.path().join("anomaly.json")),
            WatcherConfig::default(),
        );

        let report = watcher.run_cycle().await.report().cloned().unwrap();
        assert_eq!(report.checkpoint, 100);
        assert_eq!(store.load(), 100);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let fixture = Fixture::new();
        fixture.append(&(1..=3).map(baseline).collect::<Vec<_>>());

        let (tx, rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        let state = tokio::time::timeout(Duration::from_secs(5), fixture.watcher().run(rx))
            .await
            .expect("watcher should stop after shutdown");

        assert_eq!(state.checkpoint, 3);
        assert!(fixture.output.exists());
    }

    #[tokio::test]
    async fn test_run_stops_when_sender_dropped() {
        let fixture = Fixture::new();
        let (tx, rx) = broadcast::channel::<()>(1);
        drop(tx);

        let state = tokio::time::timeout(Duration::from_secs(5), fixture.watcher().run(rx))
            .await
            .unwrap();
        assert_eq!(state.checkpoint, 0);
    }

    #[test]
    fn test_builder_requires_components() {
        let result = WatcherLoopBuilder::new()
            .checkpoint_store(CheckpointStore::new("x.json"))
            .writer(ResultWriter::new("y.json"))
            .build();
        assert!(result.is_err());

        let result = WatcherLoopBuilder::new()
            .source(Arc::new(ScriptedSource::new(Vec::new())))
            .writer(ResultWriter::new("y.json"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let builder = || {
            WatcherLoopBuilder::new()
                .source(Arc::new(ScriptedSource::new(Vec::new())))
                .checkpoint_store(CheckpointStore::new(dir.path().join("c.json")))
                .writer(ResultWriter::new(dir.path().join("o.json")))
        };

        assert!(builder().poll_interval(Duration::ZERO).build().is_err());
        assert!(builder()
            .config(WatcherConfig {
                model: ModelConfig {
                    contamination: 0.0,
                    ..Default::default()
                },
                ..Default::default()
            })
            .build()
            .is_err());
        assert!(builder().build().is_ok());
    }

    #[test]
    fn test_state_advance_is_monotonic() {
        let mut state = WatcherState::new(10, ModelConfig::default());

        assert!(!state.advance(5));
        assert!(!state.advance(10));
        assert_eq!(state.checkpoint, 10);
        assert!(state.advance(11));
        assert_eq!(state.checkpoint, 11);
    }
}
