//! sensorlog - Decoder for binary wearable sensor logs
//!
//! Turns the batch-framed binary logs written by the watch firmware into typed
//! records: file header check → batch framing → per-record validation →
//! payload decode. A corrupt record ends the decode; everything read before it
//! is returned along with a report of the failure.
//!
//! ## Modules
//!
//! - **Decoder**: [`decode`], [`FileDecoder`] and parallel [`decode_files`]
//! - **Reports**: [`ErrorReport`] and the day-bucketed JSONL [`JsonlErrorSink`]
//! - **Writer**: [`SensorLogBuilder`] for producing fixtures

pub mod config;
pub mod decoder;
pub mod error;
pub mod framing;
pub mod header;
pub mod record;
pub mod registry;
pub mod report;
pub mod types;
pub mod validator;
pub mod writer;

pub use config::DecoderConfig;
pub use decoder::{
    decode, decode_files, decode_with_config, DecodeOutcome, DecodeStatus, DecodeSummary,
    FileDecoder,
};
pub use error::{DecodeError, FormatError, FormatErrorKind};
pub use registry::{SensorKind, SensorKindRegistry};
pub use report::{
    ErrorClass, ErrorReport, ErrorSink, FailureDetail, JsonlErrorSink, MemoryErrorSink,
};
pub use types::{DecodedRecord, FileHeader};
pub use writer::SensorLogBuilder;

/// Crate version, reported by the CLI
pub const SENSORLOG_VERSION: &str = env!("CARGO_PKG_VERSION");
