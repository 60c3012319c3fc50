//! Record payload decoding

use std::io::{self, Read};
use std::path::Path;

use chrono::{Local, TimeZone};

use crate::framing::ByteCursor;
use crate::report::FailureDetail;
use crate::types::{DecodedRecord, VALUE_LEN};
use crate::validator::ValidatedPrefix;

/// Render epoch milliseconds as local time, e.g. `2025-08-07 13:05:09.123`.
///
/// Timestamps chrono cannot represent become `Invalid timestamp: <ts>` rather
/// than an error.
pub fn format_timestamp(ts_millis: u64) -> String {
    i64::try_from(ts_millis)
        .ok()
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| format!("Invalid timestamp: {ts_millis}"))
}

/// Decodes payloads and numbers records for one file
pub struct RecordDecoder<'p> {
    source_path: &'p Path,
    next_sequence: u64,
}

impl<'p> RecordDecoder<'p> {
    pub fn new(source_path: &'p Path) -> Self {
        Self {
            source_path,
            next_sequence: 0,
        }
    }

    /// Sequence number the next decoded record will receive
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Read the payload for a validated prefix.
    ///
    /// The outer `Result` carries I/O failures; the inner one a truncated
    /// payload. The sequence only advances on success.
    pub fn decode<R: Read>(
        &mut self,
        cursor: &mut ByteCursor<R>,
        validated: &ValidatedPrefix<'_>,
    ) -> io::Result<Result<DecodedRecord, FailureDetail>> {
        let prefix = validated.prefix;
        let expected = prefix.payload_len();
        let bytes = cursor.read_up_to(expected)?;

        if (bytes.len() as u64) < expected {
            return Ok(Err(FailureDetail::ValueBytes {
                observed: bytes.len() as u64,
                expected,
            }));
        }

        let values = bytes
            .chunks_exact(VALUE_LEN)
            .map(|chunk| f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let record = DecodedRecord {
            source_path: self.source_path.to_path_buf(),
            sequence: self.next_sequence,
            sensor_kind: validated.entry.kind,
            collected_ts: prefix.collected_ts,
            collected_time: format_timestamp(prefix.collected_ts),
            values,
        };
        self.next_sequence += 1;
        Ok(Ok(record))
    }
}
