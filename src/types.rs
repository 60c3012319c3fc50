//! Core types for the sensorlog decoder
//!
//! Wire-level structures read from a sensor log, and the decoded record that
//! is handed to downstream tabular conversion.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::registry::SensorKind;

/// Magic number at the start of every sensor log (ASCII "SENS")
pub const MAGIC: u32 = 0x5345_4E53;

/// Size of the file header in bytes
pub const FILE_HEADER_LEN: usize = 16;

/// Size of a batch header in bytes
pub const BATCH_HEADER_LEN: usize = 12;

/// Size of a record's fixed prefix in bytes
pub const RECORD_PREFIX_LEN: usize = 20;

/// Size of one encoded payload value in bytes
pub const VALUE_LEN: usize = 4;

/// Largest record count a single batch may declare
pub const MAX_RECORDS_PER_BATCH: u32 = 10_000;

/// File header fields after the magic has been checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub format_version: u32,
    /// Epoch milliseconds
    pub creation_time: u64,
}

/// Batch framing header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchHeader {
    pub record_count: u32,
    /// Epoch milliseconds. Not attached to the records of the batch.
    pub batch_timestamp: u64,
}

/// Fixed 20-byte prefix of a record, before validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecordPrefix {
    pub sensor_type: u32,
    /// Epoch milliseconds
    pub collected_ts: u64,
    pub accuracy: u32,
    pub value_count: u32,
}

impl RawRecordPrefix {
    pub fn from_bytes(buf: &[u8; RECORD_PREFIX_LEN]) -> Self {
        Self {
            sensor_type: be_u32(&buf[0..4]),
            collected_ts: be_u64(&buf[4..12]),
            accuracy: be_u32(&buf[12..16]),
            value_count: be_u32(&buf[16..20]),
        }
    }

    /// Number of payload bytes that follow this prefix
    pub fn payload_len(&self) -> u64 {
        u64::from(self.value_count) * VALUE_LEN as u64
    }
}

/// One successfully decoded sensor record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedRecord {
    pub source_path: PathBuf,
    /// Position of the record in the file, starting at 0
    pub sequence: u64,
    pub sensor_kind: SensorKind,
    /// Raw epoch milliseconds as written by the device
    pub collected_ts: u64,
    /// Local time with millisecond precision, or an "Invalid timestamp" marker
    pub collected_time: String,
    pub values: Vec<f32>,
}

pub(crate) fn be_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}

pub(crate) fn be_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}
