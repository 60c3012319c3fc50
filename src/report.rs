//! Failure reports and the sideband error log
//!
//! A file decode stops at its first failure. That failure is captured as an
//! [`ErrorReport`] which is returned to the caller and also handed to an
//! [`ErrorSink`]. The default sink writes one JSON line per report to
//! `<root>/<YYMMDD>/<file name>.errors.jsonl`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::SinkError;

/// What was wrong with the failing record or batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum FailureDetail {
    SensorType {
        observed: u32,
        expected: String,
    },
    CollectedTs {
        observed: u64,
        digits: usize,
        expected: String,
    },
    Accuracy {
        observed: u32,
        expected: u32,
    },
    DataSize {
        observed: u32,
        expected: String,
    },
    DataSizeMin {
        observed: u32,
        expected: String,
    },
    /// Fewer than 20 prefix bytes were left for a declared record
    FixedPart {
        observed: usize,
        expected: usize,
    },
    /// Payload shorter than `value_count * 4`
    ValueBytes {
        observed: u64,
        expected: u64,
    },
    /// Fewer than 12 bytes left for a batch header
    BatchHeader {
        observed: usize,
        expected: usize,
    },
    RecordCount {
        observed: u32,
        expected: String,
    },
    /// The OS failed a read after the file header
    Io {
        message: String,
    },
}

/// Which kind of failure ended the decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Malformed batch framing
    Format,
    /// A record's fixed fields failed a check
    Validation,
    /// Input ended inside a record
    Truncation,
    Io,
}

impl FailureDetail {
    /// Name of the failing field, as written in the `field` tag
    pub fn field(&self) -> &'static str {
        match self {
            FailureDetail::SensorType { .. } => "sensor_type",
            FailureDetail::CollectedTs { .. } => "collected_ts",
            FailureDetail::Accuracy { .. } => "accuracy",
            FailureDetail::DataSize { .. } => "data_size",
            FailureDetail::DataSizeMin { .. } => "data_size_min",
            FailureDetail::FixedPart { .. } => "fixed_part",
            FailureDetail::ValueBytes { .. } => "value_bytes",
            FailureDetail::BatchHeader { .. } => "batch_header",
            FailureDetail::RecordCount { .. } => "record_count",
            FailureDetail::Io { .. } => "io",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            FailureDetail::BatchHeader { .. } | FailureDetail::RecordCount { .. } => {
                ErrorClass::Format
            }
            FailureDetail::FixedPart { .. } | FailureDetail::ValueBytes { .. } => {
                ErrorClass::Truncation
            }
            FailureDetail::Io { .. } => ErrorClass::Io,
            FailureDetail::SensorType { .. }
            | FailureDetail::CollectedTs { .. }
            | FailureDetail::Accuracy { .. }
            | FailureDetail::DataSize { .. }
            | FailureDetail::DataSizeMin { .. } => ErrorClass::Validation,
        }
    }
}

/// Diagnostic captured at the first failure in a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub source_path: PathBuf,
    /// `None` when the batch header itself could not be read
    pub batch_timestamp: Option<u64>,
    /// Zero-based; `None` for batch framing failures
    pub record_index_in_batch: Option<u32>,
    /// Offset of the first byte of the failing record or batch header
    pub byte_offset: u64,
    #[serde(serialize_with = "serialize_millis")]
    pub detected_at: DateTime<Local>,
    pub class: ErrorClass,
    pub detail: FailureDetail,
}

fn serialize_millis<S: Serializer>(
    dt: &DateTime<Local>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, false))
}

impl ErrorReport {
    /// `YYMMDD` of the detection time
    pub fn day_bucket(&self) -> String {
        self.detected_at.format("%y%m%d").to_string()
    }

    /// `<file name>.errors.jsonl` for the report's source file
    pub fn log_file_name(&self) -> String {
        let base = self
            .source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        format!("{base}.errors.jsonl")
    }

    /// Location of this report under a sideband log root
    pub fn log_path(&self, root: &Path) -> PathBuf {
        root.join(self.day_bucket()).join(self.log_file_name())
    }
}

/// Destination for first-failure reports
pub trait ErrorSink: Send + Sync {
    fn record(&self, report: &ErrorReport) -> Result<(), SinkError>;
}

/// Writes each report as a single JSON line into a day-bucketed directory.
///
/// A rerun on the same day replaces the previous report for that file.
#[derive(Debug, Clone)]
pub struct JsonlErrorSink {
    root: PathBuf,
}

impl JsonlErrorSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ErrorSink for JsonlErrorSink {
    fn record(&self, report: &ErrorReport) -> Result<(), SinkError> {
        let path = report.log_path(&self.root);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, report)?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        tracing::debug!(path = %path.display(), "Wrote error report");
        Ok(())
    }
}

/// Keeps reports in memory; useful for callers that forward reports elsewhere
#[derive(Debug, Default)]
pub struct MemoryErrorSink {
    reports: Mutex<Vec<ErrorReport>>,
}

impl MemoryErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ErrorReport> {
        match self.reports.lock() {
            Ok(reports) => reports.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ErrorSink for MemoryErrorSink {
    fn record(&self, report: &ErrorReport) -> Result<(), SinkError> {
        match self.reports.lock() {
            Ok(mut reports) => reports.push(report.clone()),
            Err(poisoned) => poisoned.into_inner().push(report.clone()),
        }
        Ok(())
    }
}
