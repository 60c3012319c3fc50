//! File decode orchestration
//!
//! This module provides the public API for sensorlog. A file is decoded in a
//! single pass through an explicit state machine:
//!
//! ```text
//! header -> batch header <-> record -> clean EOF | aborted
//! ```
//!
//! A bad or unreadable file header rejects the whole file. Any later failure,
//! including an OS read error, ends the decode with the records read so far
//! plus an [`ErrorReport`], which is also handed to the configured
//! [`ErrorSink`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use chrono::Local;
use serde::Serialize;

use crate::config::DecoderConfig;
use crate::error::DecodeError;
use crate::framing::{BatchFrame, BatchFramer, ByteCursor};
use crate::header::parse_header;
use crate::record::RecordDecoder;
use crate::registry::{SensorKind, SensorKindRegistry};
use crate::report::{ErrorReport, ErrorSink, FailureDetail, JsonlErrorSink};
use crate::types::{
    BatchHeader, DecodedRecord, FileHeader, RawRecordPrefix, BATCH_HEADER_LEN, FILE_HEADER_LEN,
    MAX_RECORDS_PER_BATCH, RECORD_PREFIX_LEN,
};
use crate::validator::RecordValidator;

/// Decode one sensor log with the default configuration.
///
/// Error reports go to `errors/<YYMMDD>/` under the working directory.
///
/// # Example
/// ```ignore
/// let outcome = sensorlog::decode("raw/dev-1/sensor_data/a_b_2025-08-07_13.bin")?;
/// let (records, error) = outcome.into_parts();
/// ```
pub fn decode(source_path: impl AsRef<Path>) -> Result<DecodeOutcome, DecodeError> {
    decode_with_config(source_path, &DecoderConfig::default())
}

/// Decode one sensor log, writing any error report under `config.error_log_dir`
pub fn decode_with_config(
    source_path: impl AsRef<Path>,
    config: &DecoderConfig,
) -> Result<DecodeOutcome, DecodeError> {
    let sink = JsonlErrorSink::new(&config.error_log_dir);
    FileDecoder::new(config.registry, &sink).decode(source_path.as_ref())
}

/// Decode several files in parallel, one file per task.
///
/// Results are returned in the order of `paths`. Files share nothing but the
/// registry and the error log root.
pub fn decode_files<P>(
    paths: &[P],
    config: &DecoderConfig,
) -> Vec<Result<DecodeOutcome, DecodeError>>
where
    P: AsRef<Path> + Sync,
{
    let sink = JsonlErrorSink::new(&config.error_log_dir);
    let decoder = FileDecoder::new(config.registry, &sink);
    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(paths.len())
        .max(1);

    let next = AtomicUsize::new(0);
    let mut results = Vec::with_capacity(paths.len());

    thread::scope(|scope| {
        let decoder = &decoder;
        let next = &next;
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut done = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(path) = paths.get(index) else { break };
                        done.push((index, decoder.decode(path.as_ref())));
                    }
                    done
                })
            })
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(done) => results.extend(done),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
    });

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}

/// Records decoded from one file, plus the first failure if the decode stopped early.
///
/// `records` is valid prefix data whether or not `error` is set.
#[derive(Debug, Clone)]
pub struct DecodeOutcome {
    pub source_path: PathBuf,
    pub header: FileHeader,
    pub records: Vec<DecodedRecord>,
    pub error: Option<ErrorReport>,
}

impl DecodeOutcome {
    /// True when the file ended exactly at a batch boundary
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_parts(self) -> (Vec<DecodedRecord>, Option<ErrorReport>) {
        (self.records, self.error)
    }

    pub fn summary(&self) -> DecodeSummary {
        let mut per_kind = BTreeMap::new();
        for record in &self.records {
            *per_kind.entry(record.sensor_kind).or_insert(0) += 1;
        }

        DecodeSummary {
            source_path: self.source_path.clone(),
            status: if self.is_clean() {
                DecodeStatus::Clean
            } else {
                DecodeStatus::Aborted
            },
            format_version: self.header.format_version,
            record_count: self.records.len(),
            per_kind,
            first_collected_ts: self.records.iter().map(|r| r.collected_ts).min(),
            last_collected_ts: self.records.iter().map(|r| r.collected_ts).max(),
            failed_field: self.error.as_ref().map(|e| e.detail.field()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStatus {
    Clean,
    Aborted,
}

/// Per-file overview for reports and alerting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeSummary {
    pub source_path: PathBuf,
    pub status: DecodeStatus,
    pub format_version: u32,
    pub record_count: usize,
    pub per_kind: BTreeMap<SensorKind, usize>,
    pub first_collected_ts: Option<u64>,
    pub last_collected_ts: Option<u64>,
    pub failed_field: Option<&'static str>,
}

/// Where the decode loop is between batches
enum State {
    ReadingBatchHeader,
    ReadingRecord { batch: BatchHeader, index: u32 },
}

/// Terminal state of a decode that got past the header
enum Termination {
    CleanEof,
    Aborted(Failure),
}

struct Failure {
    batch_timestamp: Option<u64>,
    record_index: Option<u32>,
    byte_offset: u64,
    detail: FailureDetail,
}

impl Failure {
    fn io(error: io::Error, byte_offset: u64) -> Self {
        Failure {
            batch_timestamp: None,
            record_index: None,
            byte_offset,
            detail: FailureDetail::Io {
                message: error.to_string(),
            },
        }
    }
}

/// Single-file decoder.
///
/// Holds no per-file state, so one instance can decode many files, including
/// from several threads at once.
pub struct FileDecoder<'a> {
    registry: &'a SensorKindRegistry,
    sink: &'a dyn ErrorSink,
}

impl<'a> FileDecoder<'a> {
    pub fn new(registry: &'a SensorKindRegistry, sink: &'a dyn ErrorSink) -> Self {
        Self { registry, sink }
    }

    /// Open and decode a file from disk
    pub fn decode(&self, source_path: &Path) -> Result<DecodeOutcome, DecodeError> {
        let file = File::open(source_path).map_err(|e| {
            tracing::error!(path = %source_path.display(), error = %e, "Failed to open sensor log");
            e
        })?;
        self.decode_reader(source_path, BufReader::new(file))
    }

    /// Decode from any reader; `source_path` only labels records and reports
    pub fn decode_reader<R: Read>(
        &self,
        source_path: &Path,
        reader: R,
    ) -> Result<DecodeOutcome, DecodeError> {
        let mut cursor = ByteCursor::new(reader);

        let mut header_buf = [0u8; FILE_HEADER_LEN];
        let got = cursor.fill(&mut header_buf)?;
        let header = parse_header(&header_buf[..got]).map_err(|e| {
            tracing::error!(path = %source_path.display(), error = %e, "Rejected sensor log");
            e
        })?;

        let validator = RecordValidator::new(self.registry);
        let mut decoder = RecordDecoder::new(source_path);
        let mut records = Vec::new();
        let mut state = State::ReadingBatchHeader;

        let termination = loop {
            state = match state {
                State::ReadingBatchHeader => {
                    let offset = cursor.position();
                    let frame = match BatchFramer::next_batch(&mut cursor) {
                        Ok(frame) => frame,
                        Err(e) => break Termination::Aborted(Failure::io(e, offset)),
                    };
                    match frame {
                        BatchFrame::Batch(batch) => {
                            tracing::debug!(
                                offset,
                                record_count = batch.record_count,
                                batch_timestamp = batch.batch_timestamp,
                                "Batch header"
                            );
                            State::ReadingRecord { batch, index: 0 }
                        }
                        BatchFrame::CleanEof => break Termination::CleanEof,
                        BatchFrame::Truncated { got } => {
                            break Termination::Aborted(Failure {
                                batch_timestamp: None,
                                record_index: None,
                                byte_offset: offset,
                                detail: FailureDetail::BatchHeader {
                                    observed: got,
                                    expected: BATCH_HEADER_LEN,
                                },
                            })
                        }
                        BatchFrame::OutOfRange {
                            record_count,
                            batch_timestamp,
                        } => {
                            break Termination::Aborted(Failure {
                                batch_timestamp: Some(batch_timestamp),
                                record_index: None,
                                byte_offset: offset,
                                detail: FailureDetail::RecordCount {
                                    observed: record_count,
                                    expected: format!("1..={MAX_RECORDS_PER_BATCH}"),
                                },
                            })
                        }
                    }
                }
                State::ReadingRecord { batch, index } if index == batch.record_count => {
                    State::ReadingBatchHeader
                }
                State::ReadingRecord { batch, index } => {
                    let offset = cursor.position();
                    let read = match self.read_record(&mut cursor, &validator, &mut decoder) {
                        Ok(read) => read,
                        Err(e) => {
                            break Termination::Aborted(Failure {
                                batch_timestamp: Some(batch.batch_timestamp),
                                record_index: Some(index),
                                ..Failure::io(e, offset)
                            })
                        }
                    };
                    match read {
                        Ok(record) => {
                            records.push(record);
                            State::ReadingRecord {
                                batch,
                                index: index + 1,
                            }
                        }
                        Err(detail) => {
                            break Termination::Aborted(Failure {
                                batch_timestamp: Some(batch.batch_timestamp),
                                record_index: Some(index),
                                byte_offset: offset,
                                detail,
                            })
                        }
                    }
                }
            };
        };

        let error = match termination {
            Termination::CleanEof => None,
            Termination::Aborted(failure) => Some(self.report(source_path, failure)),
        };

        tracing::info!(
            path = %source_path.display(),
            records = records.len(),
            clean = error.is_none(),
            "Decoded sensor log"
        );

        Ok(DecodeOutcome {
            source_path: source_path.to_path_buf(),
            header,
            records,
            error,
        })
    }

    fn read_record<R: Read>(
        &self,
        cursor: &mut ByteCursor<R>,
        validator: &RecordValidator<'_>,
        decoder: &mut RecordDecoder<'_>,
    ) -> io::Result<Result<DecodedRecord, FailureDetail>> {
        let mut buf = [0u8; RECORD_PREFIX_LEN];
        let got = cursor.fill(&mut buf)?;
        if got < RECORD_PREFIX_LEN {
            return Ok(Err(FailureDetail::FixedPart {
                observed: got,
                expected: RECORD_PREFIX_LEN,
            }));
        }

        let validated = match validator.validate(RawRecordPrefix::from_bytes(&buf)) {
            Ok(validated) => validated,
            Err(detail) => return Ok(Err(detail)),
        };
        decoder.decode(cursor, &validated)
    }

    fn report(&self, source_path: &Path, failure: Failure) -> ErrorReport {
        let report = ErrorReport {
            source_path: source_path.to_path_buf(),
            batch_timestamp: failure.batch_timestamp,
            record_index_in_batch: failure.record_index,
            byte_offset: failure.byte_offset,
            detected_at: Local::now(),
            class: failure.detail.class(),
            detail: failure.detail,
        };

        tracing::warn!(
            path = %source_path.display(),
            class = ?report.class,
            field = report.detail.field(),
            offset = report.byte_offset,
            record_index = ?report.record_index_in_batch,
            "Sensor log decode aborted"
        );

        if let Err(e) = self.sink.record(&report) {
            tracing::error!(
                path = %source_path.display(),
                error = %e,
                "Failed to write error report"
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ErrorClass, MemoryErrorSink};
    use crate::writer::SensorLogBuilder;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    const TS: u64 = 1_754_560_000_000;

    fn run(bytes: Vec<u8>) -> (Result<DecodeOutcome, DecodeError>, Vec<ErrorReport>) {
        let sink = MemoryErrorSink::new();
        let decoder = FileDecoder::new(SensorKindRegistry::standard(), &sink);
        let result = decoder.decode_reader(Path::new("mem.bin"), Cursor::new(bytes));
        (result, sink.reports())
    }

    /// Serves the wrapped bytes, then fails every later read
    struct FailingReader(Cursor<Vec<u8>>);

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::Other, "device detached")),
                n => Ok(n),
            }
        }
    }

    fn run_failing(bytes: Vec<u8>) -> (Result<DecodeOutcome, DecodeError>, Vec<ErrorReport>) {
        let sink = MemoryErrorSink::new();
        let decoder = FileDecoder::new(SensorKindRegistry::standard(), &sink);
        let reader = FailingReader(Cursor::new(bytes));
        let result = decoder.decode_reader(Path::new("mem.bin"), reader);
        (result, sink.reports())
    }

    fn ppg_batch(builder: SensorLogBuilder, count: usize) -> SensorLogBuilder {
        let mut builder = builder.batch(TS);
        for i in 0..count {
            builder = builder.record(1001, TS + i as u64, &[i as f32, 0.5, -0.5]);
        }
        builder
    }

    #[test]
    fn test_clean_file_returns_all_records() {
        let mut builder = ppg_batch(SensorLogBuilder::new(), 3);
        builder = builder
            .batch(TS + 100)
            .record(1004, TS + 100, &[72.0, 0.9])
            .record(1005, TS + 101, &[33.5, 34.0]);
        let (result, reports) = run(builder.build());

        let outcome = result.unwrap();
        assert!(outcome.is_clean());
        assert!(reports.is_empty());
        assert_eq!(outcome.records.len(), 5);
        let sequences: Vec<u64> = outcome.records.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
        assert_eq!(outcome.records[3].sensor_kind, SensorKind::HeartRate);
    }

    #[test]
    fn test_header_only_file_is_clean_and_empty() {
        let (result, reports) = run(SensorLogBuilder::new().build());
        let outcome = result.unwrap();
        assert!(outcome.is_clean());
        assert!(outcome.records.is_empty());
        assert!(reports.is_empty());
    }

    #[test]
    fn test_bad_magic_rejects_whole_file() {
        let bytes = ppg_batch(SensorLogBuilder::with_magic(0), 2).build();
        let (result, reports) = run(bytes);
        assert!(matches!(
            result,
            Err(DecodeError::Header(crate::error::FormatError::BadMagic { got: 0 }))
        ));
        assert!(reports.is_empty());
    }

    #[test]
    fn test_short_header_rejects_whole_file() {
        let (result, _) = run(vec![0x53, 0x45, 0x4E]);
        assert!(matches!(
            result,
            Err(DecodeError::Header(crate::error::FormatError::HeaderSize { got: 3 }))
        ));
    }

    #[test]
    fn test_record_count_out_of_range_keeps_prior_batches() {
        for bad_count in [0, MAX_RECORDS_PER_BATCH + 1] {
            let bytes = ppg_batch(SensorLogBuilder::new(), 2)
                .raw_batch_header(bad_count, TS + 50)
                .build();
            let (result, reports) = run(bytes);
            let outcome = result.unwrap();

            assert_eq!(outcome.records.len(), 2);
            let report = outcome.error.unwrap();
            assert_eq!(report.detail.field(), "record_count");
            assert_eq!(report.class, ErrorClass::Format);
            assert_eq!(report.batch_timestamp, Some(TS + 50));
            assert_eq!(report.record_index_in_batch, None);
            // header + batch header + 2 * (prefix + 12 payload bytes)
            assert_eq!(report.byte_offset, 16 + 12 + 2 * 32);
            assert_eq!(reports.len(), 1);
        }
    }

    #[test]
    fn test_truncated_batch_header_aborts() {
        let bytes = ppg_batch(SensorLogBuilder::new(), 1).raw(&[0, 0, 0, 1, 0]).build();
        let (result, _) = run(bytes);
        let outcome = result.unwrap();
        assert_eq!(outcome.records.len(), 1);
        let report = outcome.error.unwrap();
        assert_eq!(
            report.detail,
            FailureDetail::BatchHeader {
                observed: 5,
                expected: 12
            }
        );
        assert_eq!(report.batch_timestamp, None);
        assert_eq!(report.class, ErrorClass::Format);
    }

    #[test]
    fn test_truncated_payload_keeps_prior_records() {
        let bytes = ppg_batch(SensorLogBuilder::new(), 2)
            .batch(TS + 10)
            .record(1001, TS + 10, &[1.0, 2.0, 3.0])
            .record_prefix(1001, TS + 11, 0, 3)
            .raw(&[0u8; 8])
            .build();
        let (result, reports) = run(bytes);
        let outcome = result.unwrap();

        assert_eq!(outcome.records.len(), 3);
        let report = outcome.error.unwrap();
        assert_eq!(
            report.detail,
            FailureDetail::ValueBytes {
                observed: 8,
                expected: 12
            }
        );
        assert_eq!(report.class, ErrorClass::Truncation);
        assert_eq!(report.record_index_in_batch, Some(1));
        assert_eq!(report.batch_timestamp, Some(TS + 10));
        assert_eq!(report.byte_offset, 16 + 12 + 2 * 32 + 12 + 32);
        assert_eq!(reports, vec![report]);
    }

    #[test]
    fn test_missing_record_in_batch_is_fixed_part_truncation() {
        let bytes = SensorLogBuilder::new()
            .raw_batch_header(2, TS)
            .record(1005, TS, &[36.5, 36.6])
            .build();
        let (result, _) = run(bytes);
        let outcome = result.unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.error.unwrap().detail,
            FailureDetail::FixedPart {
                observed: 0,
                expected: 20
            }
        );
    }

    #[test]
    fn test_short_record_prefix_is_fixed_part_truncation() {
        for len in 1..RECORD_PREFIX_LEN {
            let bytes = SensorLogBuilder::new()
                .raw_batch_header(2, TS)
                .record(1001, TS, &[1.0, 2.0, 3.0])
                .raw(&vec![0u8; len])
                .build();
            let (result, reports) = run(bytes);
            let outcome = result.unwrap();

            assert_eq!(outcome.records.len(), 1);
            let report = outcome.error.unwrap();
            assert_eq!(
                report.detail,
                FailureDetail::FixedPart {
                    observed: len,
                    expected: 20
                }
            );
            assert_eq!(report.class, ErrorClass::Truncation);
            assert_eq!(report.record_index_in_batch, Some(1));
            assert_eq!(report.byte_offset, 16 + 12 + 32);
            assert_eq!(reports.len(), 1);
        }
    }

    #[test]
    fn test_read_error_mid_record_keeps_prior_records() {
        let mut bytes = SensorLogBuilder::new()
            .raw_batch_header(2, TS)
            .record(1001, TS, &[1.0, 2.0, 3.0])
            .build();
        bytes.extend_from_slice(&1001u32.to_be_bytes()[..]);
        bytes.push(0);
        let (result, reports) = run_failing(bytes);
        let outcome = result.unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].values, vec![1.0, 2.0, 3.0]);
        let report = outcome.error.unwrap();
        assert_eq!(report.class, ErrorClass::Io);
        assert_eq!(
            report.detail,
            FailureDetail::Io {
                message: "device detached".to_string()
            }
        );
        assert_eq!(report.batch_timestamp, Some(TS));
        assert_eq!(report.record_index_in_batch, Some(1));
        assert_eq!(report.byte_offset, 16 + 12 + 32);
        assert_eq!(reports, vec![report]);
    }

    #[test]
    fn test_read_error_at_batch_boundary_aborts() {
        let bytes = ppg_batch(SensorLogBuilder::new(), 2).build();
        let (result, reports) = run_failing(bytes);
        let outcome = result.unwrap();

        assert_eq!(outcome.records.len(), 2);
        let report = outcome.error.unwrap();
        assert_eq!(report.detail.field(), "io");
        assert_eq!(report.batch_timestamp, None);
        assert_eq!(report.record_index_in_batch, None);
        assert_eq!(report.byte_offset, 16 + 12 + 2 * 32);
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn test_read_error_in_header_rejects_file() {
        let (result, reports) = run_failing(vec![0x53, 0x45]);
        assert!(matches!(result, Err(DecodeError::Io(_))));
        assert!(reports.is_empty());
    }

    #[test]
    fn test_validation_failure_stops_reading() {
        let bytes = SensorLogBuilder::new()
            .batch(TS)
            .record(1001, TS, &[1.0, 2.0, 3.0])
            .record_prefix(1001, TS, 1, 3)
            .raw(&[0u8; 12])
            .record(1001, TS, &[1.0, 2.0, 3.0])
            .build();
        let (result, _) = run(bytes);
        let outcome = result.unwrap();
        assert_eq!(outcome.records.len(), 1);
        let report = outcome.error.unwrap();
        assert_eq!(report.detail.field(), "accuracy");
        assert_eq!(report.class, ErrorClass::Validation);
    }

    #[test]
    fn test_sequence_continues_across_batches() {
        let mut builder = SensorLogBuilder::new();
        for batch in 0..4u64 {
            builder = builder.batch(TS + batch * 1000);
            for i in 0..3u64 {
                builder = builder.record(1003, TS + batch * 1000 + i, &[0.1, 0.2, 0.3]);
            }
        }
        let (result, _) = run(builder.build());
        let outcome = result.unwrap();
        for (i, record) in outcome.records.iter().enumerate() {
            assert_eq!(record.sequence, i as u64);
        }
        assert_eq!(outcome.records.len(), 12);
    }

    #[test]
    fn test_summary_counts_kinds() {
        let bytes = ppg_batch(SensorLogBuilder::new(), 2)
            .batch(TS + 5)
            .record(1004, TS + 5, &[60.0, 1.0, 2.0])
            .record_prefix(9999, TS, 0, 3)
            .build();
        let (result, _) = run(bytes);
        let summary = result.unwrap().summary();

        assert_eq!(summary.status, DecodeStatus::Aborted);
        assert_eq!(summary.record_count, 3);
        assert_eq!(summary.per_kind.get(&SensorKind::Ppg), Some(&2));
        assert_eq!(summary.per_kind.get(&SensorKind::HeartRate), Some(&1));
        assert_eq!(summary.first_collected_ts, Some(TS));
        assert_eq!(summary.last_collected_ts, Some(TS + 5));
        assert_eq!(summary.failed_field, Some("sensor_type"));
    }
}
