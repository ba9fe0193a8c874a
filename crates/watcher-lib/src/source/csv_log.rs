//! CSV metrics log reader
//!
//! Reads the append-only `edge_metrics.csv` log written by the device
//! fleet. Columns are matched by header name:
//! device, time, vmCount, ramUsed, ramTotal, ramUtilPercent,
//! cpuUtilPercent, energyConsumed

use super::{RecordBatch, RecordSource};
use crate::models::MetricRecord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Record source backed by a CSV file on disk
pub struct CsvRecordSource {
    path: PathBuf,
}

impl CsvRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse log contents, keeping rows with `time > after`
    pub fn parse_log(content: &[u8], after: i64) -> Result<ParsedLog> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content);

        let headers = reader
            .headers()
            .context("Failed to read CSV headers")?
            .clone();

        let mut parsed = ParsedLog::default();
        if headers.is_empty() {
            return Ok(parsed);
        }

        let columns = ColumnIndex::from_headers(&headers);
        if columns.time.is_none() {
            anyhow::bail!("Metrics log has no `time` column");
        }

        for (row, result) in reader.records().enumerate() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    debug!(row = row, error = %e, "Skipping unreadable row");
                    parsed.skipped_rows += 1;
                    continue;
                }
            };

            match columns.to_metric_record(&record) {
                Some(metric) => {
                    parsed.total_rows += 1;
                    if metric.time > after {
                        parsed.records.push(metric);
                    }
                }
                None => parsed.skipped_rows += 1,
            }
        }

        Ok(parsed)
    }
}

#[async_trait]
impl RecordSource for CsvRecordSource {
    async fn fetch(&self, after: i64) -> Result<Option<RecordBatch>> {
        let content = match fs::read(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Input file missing");
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        let complete = complete_lines(&content);
        if complete.len() < content.len() {
            debug!(
                path = %self.path.display(),
                pending_bytes = content.len() - complete.len(),
                "Holding back unterminated last line"
            );
        }

        let parsed = Self::parse_log(complete, after)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        if parsed.skipped_rows > 0 {
            warn!(
                path = %self.path.display(),
                skipped = parsed.skipped_rows,
                "Skipped rows without a usable time value"
            );
        }

        if parsed.total_rows == 0 {
            debug!(path = %self.path.display(), "Metrics log is empty");
            return Ok(None);
        }

        if parsed.records.is_empty() {
            return Ok(None);
        }

        Ok(Some(RecordBatch::from_records(parsed.records)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Cut `content` after its last newline
///
/// A row still being appended has no terminator yet and is left for the
/// next read. Content without any newline is returned whole so a bare
/// header still parses.
fn complete_lines(content: &[u8]) -> &[u8] {
    match content.iter().rposition(|&b| b == b'\n') {
        Some(last) => &content[..=last],
        None => content,
    }
}

/// Result of parsing the metrics log
#[derive(Debug, Default)]
pub struct ParsedLog {
    /// Records newer than the checkpoint, in log order
    pub records: Vec<MetricRecord>,
    /// Rows with a valid time, regardless of checkpoint
    pub total_rows: usize,
    /// Rows dropped for a missing or unparseable time
    pub skipped_rows: usize,
}

/// Header positions for the known columns
#[derive(Debug, Default)]
struct ColumnIndex {
    device: Option<usize>,
    time: Option<usize>,
    vm_count: Option<usize>,
    ram_used: Option<usize>,
    ram_total: Option<usize>,
    ram_util_percent: Option<usize>,
    cpu_util_percent: Option<usize>,
    energy_consumed: Option<usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let positions: HashMap<&str, usize> =
            headers.iter().enumerate().map(|(i, h)| (h, i)).collect();

        Self {
            device: positions.get("device").copied(),
            time: positions.get("time").copied(),
            vm_count: positions.get("vmCount").copied(),
            ram_used: positions.get("ramUsed").copied(),
            ram_total: positions.get("ramTotal").copied(),
            ram_util_percent: positions.get("ramUtilPercent").copied(),
            cpu_util_percent: positions.get("cpuUtilPercent").copied(),
            energy_consumed: positions.get("energyConsumed").copied(),
        }
    }

    fn to_metric_record(&self, record: &csv::StringRecord) -> Option<MetricRecord> {
        let time = self.cell(record, self.time).and_then(parse_time)?;

        Some(MetricRecord {
            device: self.cell(record, self.device).unwrap_or_default().to_string(),
            time,
            vm_count: self.number(record, self.vm_count),
            ram_used: self.number(record, self.ram_used),
            ram_total: self.number(record, self.ram_total),
            ram_util_percent: self.number(record, self.ram_util_percent),
            cpu_util_percent: self.number(record, self.cpu_util_percent),
            energy_consumed: self.number(record, self.energy_consumed),
        })
    }

    fn cell<'r>(&self, record: &'r csv::StringRecord, column: Option<usize>) -> Option<&'r str> {
        column
            .and_then(|i| record.get(i))
            .filter(|value| !value.is_empty())
    }

    fn number(&self, record: &csv::StringRecord, column: Option<usize>) -> Option<f64> {
        self.cell(record, column)
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite())
    }
}

/// Parse a time cell written either as an integer or a float
fn parse_time(value: &str) -> Option<i64> {
    value.parse::<i64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .map(|t| t.trunc() as i64)
    })
}
