//! Sensor log encoder
//!
//! Builds files in the on-device layout. Used to produce fixtures, including
//! deliberately corrupt ones via [`SensorLogBuilder::raw`] and
//! [`SensorLogBuilder::raw_batch_header`].

use std::fs;
use std::io;
use std::path::Path;

use crate::types::MAGIC;

/// Incremental sensor log builder.
///
/// Batches opened with [`batch`](Self::batch) get their record count filled in
/// from the records added before the next batch starts.
#[derive(Debug, Clone)]
pub struct SensorLogBuilder {
    buf: Vec<u8>,
    open_batch: Option<OpenBatch>,
}

#[derive(Debug, Clone, Copy)]
struct OpenBatch {
    count_offset: usize,
    records: u32,
}

impl Default for SensorLogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorLogBuilder {
    /// Start a file with a valid header (format version 1)
    pub fn new() -> Self {
        Self::with_header(MAGIC, 1, 1_722_470_400_000)
    }

    /// Start a file with the given magic, for rejection fixtures
    pub fn with_magic(magic: u32) -> Self {
        Self::with_header(magic, 1, 1_722_470_400_000)
    }

    pub fn with_header(magic: u32, format_version: u32, creation_time: u64) -> Self {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&magic.to_be_bytes());
        buf.extend_from_slice(&format_version.to_be_bytes());
        buf.extend_from_slice(&creation_time.to_be_bytes());
        Self {
            buf,
            open_batch: None,
        }
    }

    /// Open a batch whose record count is the number of records that follow
    pub fn batch(mut self, batch_timestamp: u64) -> Self {
        self.close_batch();
        let count_offset = self.buf.len();
        self.buf.extend_from_slice(&0u32.to_be_bytes());
        self.buf.extend_from_slice(&batch_timestamp.to_be_bytes());
        self.open_batch = Some(OpenBatch {
            count_offset,
            records: 0,
        });
        self
    }

    /// Write a batch header with an explicit record count.
    ///
    /// Records added afterwards are not counted.
    pub fn raw_batch_header(mut self, record_count: u32, batch_timestamp: u64) -> Self {
        self.close_batch();
        self.buf.extend_from_slice(&record_count.to_be_bytes());
        self.buf.extend_from_slice(&batch_timestamp.to_be_bytes());
        self
    }

    /// Append a well-formed record (accuracy 0, `value_count == values.len()`)
    pub fn record(self, sensor_type: u32, collected_ts: u64, values: &[f32]) -> Self {
        let mut builder = self.record_prefix(sensor_type, collected_ts, 0, values.len() as u32);
        for value in values {
            builder.buf.extend_from_slice(&value.to_be_bytes());
        }
        builder
    }

    /// Append only the 20-byte record prefix; the payload is up to the caller
    pub fn record_prefix(
        mut self,
        sensor_type: u32,
        collected_ts: u64,
        accuracy: u32,
        value_count: u32,
    ) -> Self {
        self.buf.extend_from_slice(&sensor_type.to_be_bytes());
        self.buf.extend_from_slice(&collected_ts.to_be_bytes());
        self.buf.extend_from_slice(&accuracy.to_be_bytes());
        self.buf.extend_from_slice(&value_count.to_be_bytes());
        if let Some(open) = self.open_batch.as_mut() {
            open.records += 1;
        }
        self
    }

    /// Append arbitrary bytes
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        self.close_batch();
        self.buf
    }

    pub fn write_to(self, path: impl AsRef<Path>) -> io::Result<()> {
        fs::write(path, self.build())
    }

    fn close_batch(&mut self) {
        if let Some(open) = self.open_batch.take() {
            let start = open.count_offset;
            self.buf[start..start + 4].copy_from_slice(&open.records.to_be_bytes());
        }
    }
}
