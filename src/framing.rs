//! Byte cursor and batch framing
//!
//! The cursor tracks how many bytes have been consumed so failures can be
//! reported at the offset where the failing unit began. Reads never treat a
//! short read as an error: callers get the exact number of bytes that were
//! available and decide what a shortfall means.

use std::io::{self, ErrorKind, Read};

use crate::types::{be_u32, be_u64, BatchHeader, BATCH_HEADER_LEN, MAX_RECORDS_PER_BATCH};

/// Position-tracking reader owned by a single file decode
pub struct ByteCursor<R> {
    inner: R,
    position: u64,
}

impl<R: Read> ByteCursor<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Offset of the next byte to be read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Fill `buf` as far as the input allows.
    ///
    /// Returns the number of bytes read, which is less than `buf.len()` only
    /// at end of input.
    pub fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.position += filled as u64;
        Ok(filled)
    }

    /// Read up to `len` bytes into a fresh buffer.
    ///
    /// The buffer grows with the data actually read, so a bogus length in a
    /// corrupt record cannot force a large allocation up front.
    pub fn read_up_to(&mut self, len: u64) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        let read = self.inner.by_ref().take(len).read_to_end(&mut buf)?;
        self.position += read as u64;
        Ok(buf)
    }
}

/// Result of reading one batch header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchFrame {
    Batch(BatchHeader),
    /// No bytes left at a batch boundary
    CleanEof,
    /// 1 to 11 bytes left where a batch header should start
    Truncated { got: usize },
    /// Header read in full but the record count is outside `1..=10000`
    OutOfRange {
        record_count: u32,
        batch_timestamp: u64,
    },
}

/// Reads successive batch headers from a cursor
pub struct BatchFramer;

impl BatchFramer {
    pub fn next_batch<R: Read>(cursor: &mut ByteCursor<R>) -> io::Result<BatchFrame> {
        let mut buf = [0u8; BATCH_HEADER_LEN];
        let got = cursor.fill(&mut buf)?;

        if got == 0 {
            return Ok(BatchFrame::CleanEof);
        }
        if got < BATCH_HEADER_LEN {
            return Ok(BatchFrame::Truncated { got });
        }

        let record_count = be_u32(&buf[0..4]);
        let batch_timestamp = be_u64(&buf[4..12]);

        if record_count == 0 || record_count > MAX_RECORDS_PER_BATCH {
            return Ok(BatchFrame::OutOfRange {
                record_count,
                batch_timestamp,
            });
        }

        Ok(BatchFrame::Batch(BatchHeader {
            record_count,
            batch_timestamp,
        }))
    }
}
