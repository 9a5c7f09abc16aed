//! Append-only sample log.
//!
//! Every applied sample can be mirrored into a JSON document that is written
//! incrementally, one entry at a time, so a crash loses at most the closing
//! brackets.
//!
//! # Storage Format
//!
//! One file per recording, named `YYYYMMDD_HHMMSS_sensor.json` (UTC):
//!
//! ```json
//! {"session_id": "<uuid>", "data": [
//!   {"elapsed_seconds": 0.1, "timestamp": "2026-02-15T01:30:00.100Z",
//!    "path": ["Server01", "CPU", "Temp"], "value": 42.5,
//!    "lower_threshold": 10.0, "upper_threshold": 80.0, "failed": false}
//! ]}
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::model::Sample;
use crate::value::Value;

// ---------------------------------------------------------------------------
// Log entries
// ---------------------------------------------------------------------------

/// One entry of a sample log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedSample {
    pub elapsed_seconds: f64,
    pub timestamp: String,
    pub path: Vec<String>,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_threshold: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_threshold: Option<Value>,
    #[serde(default)]
    pub failed: bool,
}

impl RecordedSample {
    /// Rebuild the sample, placing it `elapsed_seconds` after `start`.
    pub fn to_sample(&self, start: Instant) -> Sample {
        let offset = Duration::try_from_secs_f64(self.elapsed_seconds).unwrap_or_default();
        Sample {
            path: self.path.clone(),
            value: self.value.clone(),
            lower_threshold: self.lower_threshold.clone(),
            upper_threshold: self.upper_threshold.clone(),
            failed: self.failed,
            timestamp: Some(start + offset),
        }
    }
}

/// A parsed log file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleLog {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub data: Vec<RecordedSample>,
}

/// Parse a finished sample log.
pub fn read_sample_log(path: &Path) -> Result<SampleLog> {
    let text = fs::read_to_string(path)?;
    let log: SampleLog = serde_json::from_str(&text)?;
    Ok(log)
}

// ---------------------------------------------------------------------------
// Recorder config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub output_dir: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("logs"),
        }
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Incremental writer for one sample log file.
pub struct SampleRecorder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    session_id: String,
    started_instant: Instant,
    total_samples: u64,
}

impl SampleRecorder {
    /// Create the output directory and open a fresh, timestamped log file.
    pub fn new(config: &RecorderConfig) -> Result<Self> {
        fs::create_dir_all(&config.output_dir)?;

        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let path = unique_path(&config.output_dir, &log_file_stem(since_epoch));
        let session_id = Uuid::new_v4().to_string();

        let mut writer = BufWriter::new(File::create(&path)?);
        write!(
            writer,
            "{{\"session_id\": {}, \"data\": [",
            serde_json::to_string(&session_id)?
        )?;
        writer.flush()?;

        log::info!("recording samples to {}", path.display());
        Ok(Self {
            path,
            writer: Some(writer),
            session_id,
            started_instant: Instant::now(),
            total_samples: 0,
        })
    }

    /// Append one sample. Entries are flushed immediately.
    pub fn record(&mut self, sample: &Sample) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        // JSON has no NaN or infinity; serde_json writes them as `null`,
        // which the reader rejects.
        if !is_finite(&sample.value) {
            log::warn!(
                "not recording non-finite value {} for {}",
                sample.value,
                sample.display_path()
            );
            return Ok(());
        }

        let entry = RecordedSample {
            elapsed_seconds: self.started_instant.elapsed().as_secs_f64(),
            timestamp: format_iso8601_millis(
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default(),
            ),
            path: sample.path.clone(),
            value: sample.value.clone(),
            lower_threshold: sample.lower_threshold.clone().filter(is_finite),
            upper_threshold: sample.upper_threshold.clone().filter(is_finite),
            failed: sample.failed,
        };

        // Whole entry in one write.
        let separator = if self.total_samples == 0 { "\n" } else { ",\n" };
        let line = format!("{separator}  {}", serde_json::to_string(&entry)?);
        writer.write_all(line.as_bytes())?;
        writer.flush()?;

        self.total_samples += 1;
        Ok(())
    }

    /// Close the document. Returns the path of the finished file.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.close()?;
        Ok(self.path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn elapsed(&self) -> Duration {
        self.started_instant.elapsed()
    }

    fn close(&mut self) -> std::io::Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        if self.total_samples > 0 {
            writer.write_all(b"\n")?;
        }
        writer.write_all(b"]}\n")?;
        writer.flush()?;
        log::info!(
            "closed sample log {} ({} samples)",
            self.path.display(),
            self.total_samples
        );
        Ok(())
    }
}

impl Drop for SampleRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to close sample log {}: {e}", self.path.display());
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_finite(value: &Value) -> bool {
    !matches!(value, Value::Double(d) if !d.is_finite())
}

/// File stem for a log started at `since_epoch`: `20260215_013000`.
fn log_file_stem(since_epoch: Duration) -> String {
    let (year, month, day, hour, min, sec) = secs_to_utc(since_epoch.as_secs());
    format!("{year:04}{month:02}{day:02}_{hour:02}{min:02}{sec:02}")
}

/// `<stem>_sensor.json`, or `<stem>_<n>_sensor.json` if that file exists.
fn unique_path(dir: &Path, stem: &str) -> PathBuf {
    let first = dir.join(format!("{stem}_sensor.json"));
    if !first.exists() {
        return first;
    }
    let mut n = 1;
    loop {
        let candidate = dir.join(format!("{stem}_{n}_sensor.json"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Example: `2026-02-15T01:30:00.250Z`
fn format_iso8601_millis(since_epoch: Duration) -> String {
    let (year, month, day, hour, min, sec) = secs_to_utc(since_epoch.as_secs());
    format!(
        "{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}.{:03}Z",
        since_epoch.subsec_millis()
    )
}

/// Seconds since the Unix epoch to (year, month, day, hour, minute, second)
/// UTC. No leap seconds.
fn secs_to_utc(secs: u64) -> (u64, u64, u64, u64, u64, u64) {
    let sec = secs % 60;
    let min = (secs / 60) % 60;
    let hour = (secs / 3600) % 24;

    let mut days = secs / 86400;
    let mut year = 1970u64;
    loop {
        let len = if is_leap(year) { 366 } else { 365 };
        if days < len {
            break;
        }
        days -= len;
        year += 1;
    }

    let february = if is_leap(year) { 29 } else { 28 };
    let month_lengths = [31, february, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut month = 1u64;
    for len in month_lengths {
        if days < len {
            break;
        }
        days -= len;
        month += 1;
    }

    (year, month, days + 1, hour, min, sec)
}

fn is_leap(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> RecorderConfig {
        RecorderConfig {
            output_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_secs_to_utc() {
        assert_eq!(secs_to_utc(0), (1970, 1, 1, 0, 0, 0));
        assert_eq!(secs_to_utc(946684800), (2000, 1, 1, 0, 0, 0));
        // 2024-02-29 12:34:56
        assert_eq!(secs_to_utc(1709210096), (2024, 2, 29, 12, 34, 56));
        assert_eq!(secs_to_utc(1735689599), (2024, 12, 31, 23, 59, 59));
    }

    #[test]
    fn test_is_leap() {
        assert!(is_leap(2000));
        assert!(is_leap(2024));
        assert!(!is_leap(1900));
        assert!(!is_leap(2023));
    }

    #[test]
    fn test_file_stem_and_timestamp_format() {
        assert_eq!(log_file_stem(Duration::from_secs(0)), "19700101_000000");
        assert_eq!(
            format_iso8601_millis(Duration::from_millis(946684800250)),
            "2000-01-01T00:00:00.250Z"
        );
    }

    #[test]
    fn test_empty_log_is_valid_json() {
        let tmp = tempfile::tempdir().unwrap();
        let recorder = SampleRecorder::new(&config(tmp.path())).unwrap();
        let id = recorder.session_id().to_string();
        let path = recorder.finish().unwrap();

        assert!(path.file_name().unwrap().to_string_lossy().ends_with("_sensor.json"));
        let log = read_sample_log(&path).unwrap();
        assert_eq!(log.session_id.as_deref(), Some(id.as_str()));
        assert!(log.data.is_empty());
    }

    #[test]
    fn test_records_roundtrip_through_reader() {
        let tmp = tempfile::tempdir().unwrap();
        let mut recorder = SampleRecorder::new(&config(tmp.path())).unwrap();
        recorder
            .record(
                &Sample::new(["Srv", "CPU", "Temp"], 42.5)
                    .with_thresholds(Some(Value::from(10.0)), Some(Value::from(80.0))),
            )
            .unwrap();
        recorder
            .record(&Sample::new(["Srv", "Status"], "Degraded").with_failed(true))
            .unwrap();
        assert_eq!(recorder.total_samples(), 2);
        let path = recorder.finish().unwrap();

        let log = read_sample_log(&path).unwrap();
        assert_eq!(log.data.len(), 2);
        let first = &log.data[0];
        assert_eq!(first.path, vec!["Srv", "CPU", "Temp"]);
        assert_eq!(first.value, Value::from(42.5));
        assert_eq!(first.upper_threshold, Some(Value::from(80.0)));
        assert!(!first.failed);
        assert!(first.timestamp.ends_with('Z'));

        let second = &log.data[1];
        assert_eq!(second.value, Value::from("Degraded"));
        assert!(second.failed);
        assert!(second.lower_threshold.is_none());
        assert!(second.elapsed_seconds >= first.elapsed_seconds);
    }

    #[test]
    fn test_optional_thresholds_are_omitted() {
        let tmp = tempfile::tempdir().unwrap();
        let mut recorder = SampleRecorder::new(&config(tmp.path())).unwrap();
        recorder.record(&Sample::new(["A"], true)).unwrap();
        let path = recorder.finish().unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(!text.contains("lower_threshold"));
        assert!(text.contains("\"failed\":false"));
    }

    #[test]
    fn test_drop_closes_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = {
            let mut recorder = SampleRecorder::new(&config(tmp.path())).unwrap();
            recorder.record(&Sample::new(["A"], 1_i64)).unwrap();
            recorder.path().to_path_buf()
        };
        let log = read_sample_log(&path).unwrap();
        assert_eq!(log.data.len(), 1);
    }

    #[test]
    fn test_non_finite_values_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut recorder = SampleRecorder::new(&config(tmp.path())).unwrap();
        recorder.record(&Sample::new(["A"], f64::NAN)).unwrap();
        recorder.record(&Sample::new(["B"], f64::INFINITY)).unwrap();
        recorder
            .record(
                &Sample::new(["C"], 2.5)
                    .with_thresholds(Some(Value::from(f64::NEG_INFINITY)), Some(Value::from(9.0))),
            )
            .unwrap();
        assert_eq!(recorder.total_samples(), 1);
        let path = recorder.finish().unwrap();

        let log = read_sample_log(&path).unwrap();
        assert_eq!(log.data.len(), 1);
        assert_eq!(log.data[0].path, vec!["C"]);
        assert_eq!(log.data[0].value, Value::from(2.5));
        assert!(log.data[0].lower_threshold.is_none());
        assert_eq!(log.data[0].upper_threshold, Some(Value::from(9.0)));
    }

    #[test]
    fn test_each_entry_is_one_line() {
        let tmp = tempfile::tempdir().unwrap();
        let mut recorder = SampleRecorder::new(&config(tmp.path())).unwrap();
        for i in 0..5_i64 {
            recorder.record(&Sample::new(["Counter"], i)).unwrap();
        }
        let path = recorder.finish().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let entries: Vec<&str> = text.lines().filter(|l| l.contains("\"path\"")).collect();
        assert_eq!(entries.len(), 5);
        assert!(entries[..4].iter().all(|l| l.ends_with("},")));
        assert_eq!(read_sample_log(&path).unwrap().data.len(), 5);
    }

    #[test]
    fn test_rotation_within_one_second_gets_unique_names() {
        let tmp = tempfile::tempdir().unwrap();
        let first = SampleRecorder::new(&config(tmp.path())).unwrap();
        let second = SampleRecorder::new(&config(tmp.path())).unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn test_recorded_sample_to_sample() {
        let entry = RecordedSample {
            elapsed_seconds: 1.5,
            timestamp: "2000-01-01T00:00:00.000Z".into(),
            path: vec!["A".into(), "B".into()],
            value: Value::from(3_i64),
            lower_threshold: None,
            upper_threshold: Some(Value::from(5_i64)),
            failed: true,
        };
        let start = Instant::now();
        let sample = entry.to_sample(start);
        assert_eq!(sample.path, vec!["A", "B"]);
        assert_eq!(sample.timestamp, Some(start + Duration::from_millis(1500)));
        assert!(sample.failed);
    }
}
