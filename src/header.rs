//! File header parsing

use crate::error::FormatError;
use crate::types::{be_u32, be_u64, FileHeader, FILE_HEADER_LEN, MAGIC};

/// Parse the bytes read from the start of a file.
///
/// `buf` holds whatever was available, so a short file is reported with the
/// number of bytes it actually had.
pub fn parse_header(buf: &[u8]) -> Result<FileHeader, FormatError> {
    if buf.len() != FILE_HEADER_LEN {
        return Err(FormatError::HeaderSize { got: buf.len() });
    }

    let magic = be_u32(&buf[0..4]);
    if magic != MAGIC {
        return Err(FormatError::BadMagic { got: magic });
    }

    Ok(FileHeader {
        format_version: be_u32(&buf[4..8]),
        creation_time: be_u64(&buf[8..16]),
    })
}
