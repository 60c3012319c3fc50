//! Error types for sensorlog

use std::io;

use thiserror::Error;

/// Which part of the file header was malformed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatErrorKind {
    /// Fewer than 16 bytes were available for the file header
    HeaderSize,
    /// The first four bytes are not the `SENS` magic
    BadMagic,
}

/// Malformed file header.
///
/// Malformed batch framing after the header is reported through
/// [`crate::ErrorReport`] with class [`crate::ErrorClass::Format`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Invalid header size: {got} bytes (expected 16)")]
    HeaderSize { got: usize },

    #[error("Invalid magic header: {got:#010x}")]
    BadMagic { got: u32 },
}

impl FormatError {
    pub fn kind(&self) -> FormatErrorKind {
        match self {
            FormatError::HeaderSize { .. } => FormatErrorKind::HeaderSize,
            FormatError::BadMagic { .. } => FormatErrorKind::BadMagic,
        }
    }
}

/// Whole-file rejection: nothing in the file was decoded.
///
/// `Io` covers opening the file and reading its header. Failures after the
/// header, read errors included, never surface here; they end the decode as
/// [`crate::DecodeOutcome`] with an attached [`crate::ErrorReport`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Rejected file header: {0}")]
    Header(#[from] FormatError),
}

/// Failure to persist an error report to the sideband log
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error writing error log: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to serialize error report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Invalid decoder configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is set but empty")]
    EmptyVar(&'static str),
}
