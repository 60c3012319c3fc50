//! End-to-end decoding of sensor logs on disk.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use pretty_assertions::assert_eq;
use sensorlog::{
    decode_files, decode_with_config, DecodeError, DecodeStatus, DecoderConfig, ErrorReport,
    FormatError, SensorKind, SensorLogBuilder,
};
use tempfile::TempDir;

const TS: u64 = 1_754_560_000_000;

fn setup() -> (TempDir, DecoderConfig) {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let config = DecoderConfig::default().with_error_log_dir(dir.path().join("errors"));
    (dir, config)
}

fn write(dir: &Path, name: &str, builder: SensorLogBuilder) -> PathBuf {
    let path = dir.join(name);
    builder.write_to(&path).expect("failed to write fixture");
    path
}

/// Three batches of 4, 1 and 2 records mixing every collected kind
fn well_formed() -> SensorLogBuilder {
    SensorLogBuilder::new()
        .batch(TS)
        .record(1001, TS, &[1.0, 2.0, 3.0])
        .record(1003, TS + 1, &[0.1, 0.2, 0.3])
        .record(1004, TS + 2, &[71.0, 0.98])
        .record(1005, TS + 3, &[33.1, 33.2])
        .batch(TS + 1000)
        .record(1006, TS + 1000, &[9.8, 0.0, 0.1])
        .batch(TS + 2000)
        .record(1004, TS + 2000, &[72.0, 0.97, 1.0, 1.0])
        .record(1001, TS + 2001, &[4.0, 5.0, 6.0])
}

fn error_log_for(config: &DecoderConfig, source: &Path) -> PathBuf {
    let day = Local::now().format("%y%m%d").to_string();
    let name = format!("{}.errors.jsonl", source.file_name().unwrap().to_string_lossy());
    config.error_log_dir.join(day).join(name)
}

#[test]
fn well_formed_file_decodes_every_record() {
    let (dir, config) = setup();
    let path = write(dir.path(), "dev_a_2025-08-07_13.bin", well_formed());

    let outcome = decode_with_config(&path, &config).unwrap();

    assert!(outcome.is_clean());
    assert_eq!(outcome.records.len(), 4 + 1 + 2);
    for (i, record) in outcome.records.iter().enumerate() {
        assert_eq!(record.sequence, i as u64);
        assert_eq!(record.source_path, path);
    }
    assert_eq!(outcome.records[4].sensor_kind, SensorKind::AcceAlt);
    assert_eq!(outcome.records[5].values, vec![72.0, 0.97, 1.0, 1.0]);
    assert!(!config.error_log_dir.exists());
}

#[test]
fn truncated_payload_writes_sideband_report() {
    let (dir, config) = setup();
    let builder = well_formed()
        .batch(TS + 3000)
        .record_prefix(1001, TS + 3000, 0, 3)
        .raw(&[0u8; 8]);
    let path = write(dir.path(), "dev_a_2025-08-07_14.bin", builder);

    let outcome = decode_with_config(&path, &config).unwrap();
    assert_eq!(outcome.records.len(), 7);
    let report = outcome.error.clone().unwrap();
    assert_eq!(report.detail.field(), "value_bytes");
    assert_eq!(report.record_index_in_batch, Some(0));

    let log = fs::read_to_string(error_log_for(&config, &path)).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 1);

    let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(value["class"], "truncation");
    assert_eq!(value["detail"]["field"], "value_bytes");
    assert_eq!(value["detail"]["observed"], 8);
    assert_eq!(value["detail"]["expected"], 12);
    assert_eq!(value["batch_timestamp"], TS + 3000);

    let parsed: ErrorReport = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(parsed.byte_offset, report.byte_offset);
}

#[test]
fn bad_magic_rejects_without_report() {
    let (dir, config) = setup();
    let builder = SensorLogBuilder::with_magic(0).batch(TS).record(1001, TS, &[1.0, 2.0, 3.0]);
    let path = write(dir.path(), "bad_magic.bin", builder);

    let err = decode_with_config(&path, &config).unwrap_err();
    assert!(matches!(err, DecodeError::Header(FormatError::BadMagic { got: 0 })));
    assert!(!error_log_for(&config, &path).exists());
}

#[test]
fn missing_file_is_io_error() {
    let (dir, config) = setup();
    let err = decode_with_config(dir.path().join("nope.bin"), &config).unwrap_err();
    assert!(matches!(err, DecodeError::Io(_)));
}

#[test]
fn unwritable_error_dir_does_not_change_outcome() {
    let (dir, _) = setup();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"not a directory").unwrap();
    let config = DecoderConfig::default().with_error_log_dir(&blocker);

    let builder = well_formed().raw_batch_header(0, TS + 5000);
    let path = write(dir.path(), "dev_b.bin", builder);

    let outcome = decode_with_config(&path, &config).unwrap();
    assert_eq!(outcome.records.len(), 7);
    assert_eq!(outcome.error.unwrap().detail.field(), "record_count");
}

#[test]
fn parallel_decode_preserves_input_order() {
    let (dir, config) = setup();
    let mut paths = Vec::new();
    for i in 0..6 {
        let builder = match i % 3 {
            0 => well_formed(),
            1 => well_formed().raw(&[0, 0, 0]),
            _ => SensorLogBuilder::with_magic(0xDEAD_BEEF),
        };
        paths.push(write(dir.path(), &format!("dev_{i}.bin"), builder));
    }

    let results = decode_files(&paths, &config);
    assert_eq!(results.len(), paths.len());

    for (i, (result, path)) in results.iter().zip(&paths).enumerate() {
        match i % 3 {
            0 => {
                let outcome = result.as_ref().unwrap();
                assert_eq!(&outcome.source_path, path);
                assert_eq!(outcome.summary().status, DecodeStatus::Clean);
            }
            1 => {
                let outcome = result.as_ref().unwrap();
                assert_eq!(&outcome.source_path, path);
                assert_eq!(outcome.records.len(), 7);
                assert_eq!(outcome.summary().failed_field, Some("batch_header"));
                assert!(error_log_for(&config, path).exists());
            }
            _ => assert!(matches!(
                result,
                Err(DecodeError::Header(FormatError::BadMagic { got: 0xDEAD_BEEF }))
            )),
        }
    }
}

#[test]
fn empty_input_list() {
    let (_dir, config) = setup();
    let paths: Vec<PathBuf> = Vec::new();
    assert!(decode_files(&paths, &config).is_empty());
}
