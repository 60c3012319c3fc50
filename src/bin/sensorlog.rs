//! sensorlog CLI - Command-line interface for the sensor log decoder
//!
//! Commands:
//! - decode: Decode one sensor log into NDJSON/JSON records
//! - inspect: Decode many logs in parallel and summarize each
//! - doctor: Diagnose configuration and the error log directory

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sensorlog::error::{ConfigError, FormatErrorKind};
use sensorlog::registry::LengthRule;
use sensorlog::{
    decode_files, decode_with_config, DecodeError, DecodeSummary, DecodedRecord, DecoderConfig,
    SensorKindRegistry, SENSORLOG_VERSION,
};

/// sensorlog - Decode binary wearable sensor logs
#[derive(Parser)]
#[command(name = "sensorlog")]
#[command(version = SENSORLOG_VERSION)]
#[command(about = "Decode binary wearable sensor logs into typed records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode one sensor log
    Decode {
        /// Input sensor log
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Root directory for day-bucketed error reports (overrides SENSORLOG_ERROR_DIR)
        #[arg(long)]
        error_dir: Option<PathBuf>,
    },

    /// Decode sensor logs in parallel and print a summary per file
    Inspect {
        /// Input sensor logs
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,

        /// Root directory for day-bucketed error reports (overrides SENSORLOG_ERROR_DIR)
        #[arg(long)]
        error_dir: Option<PathBuf>,
    },

    /// Diagnose configuration and the error log directory
    Doctor {
        /// Root directory for day-bucketed error reports (overrides SENSORLOG_ERROR_DIR)
        #[arg(long)]
        error_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Install a stderr `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Stdout is reserved for decoded output.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<(), SensorlogCliError> {
    match cli.command {
        Commands::Decode {
            input,
            output,
            output_format,
            error_dir,
        } => cmd_decode(&input, &output, output_format, load_config(error_dir)?),

        Commands::Inspect {
            inputs,
            json,
            error_dir,
        } => cmd_inspect(&inputs, json, load_config(error_dir)?),

        Commands::Doctor { error_dir, json } => cmd_doctor(load_config(error_dir)?, json),
    }
}

fn load_config(error_dir: Option<PathBuf>) -> Result<DecoderConfig, SensorlogCliError> {
    let config = DecoderConfig::from_env()?;
    Ok(match error_dir {
        Some(dir) => config.with_error_log_dir(dir),
        None => config,
    })
}

fn cmd_decode(
    input: &Path,
    output: &Path,
    output_format: OutputFormat,
    config: DecoderConfig,
) -> Result<(), SensorlogCliError> {
    let outcome = decode_with_config(input, &config)?;
    let (records, error) = outcome.into_parts();

    // Prefix records are written even when the decode aborted
    let output_data = format_output(&records, &output_format)?;
    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout().lock();
        stdout.write_all(output_data.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(output, output_data)?;
    }

    match error {
        None => Ok(()),
        Some(report) => Err(SensorlogCliError::Aborted {
            records: records.len(),
            report: serde_json::to_value(&report)?,
        }),
    }
}

fn cmd_inspect(
    inputs: &[PathBuf],
    json: bool,
    config: DecoderConfig,
) -> Result<(), SensorlogCliError> {
    let entries: Vec<InspectEntry> = decode_files(inputs, &config)
        .into_iter()
        .zip(inputs)
        .map(|(result, path)| match result {
            Ok(outcome) => InspectEntry::Decoded(outcome.summary()),
            Err(e) => InspectEntry::Rejected {
                source_path: path.clone(),
                status: "rejected",
                error: e.to_string(),
            },
        })
        .collect();

    let unclean = entries
        .iter()
        .filter(|e| !matches!(e, InspectEntry::Decoded(s) if s.failed_field.is_none()))
        .count();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!("Inspect Report");
        println!("==============");
        println!("Files:   {}", entries.len());
        println!("Unclean: {}", unclean);
        println!();

        for entry in &entries {
            match entry {
                InspectEntry::Decoded(summary) => {
                    let kinds: Vec<String> = summary
                        .per_kind
                        .iter()
                        .map(|(kind, count)| format!("{}={}", kind, count))
                        .collect();
                    let status = match summary.failed_field {
                        None => "[OK]".to_string(),
                        Some(field) => format!("[ABORTED at {}]", field),
                    };
                    println!(
                        "  {} {}: {} records ({})",
                        status,
                        summary.source_path.display(),
                        summary.record_count,
                        kinds.join(", ")
                    );
                }
                InspectEntry::Rejected {
                    source_path, error, ..
                } => {
                    println!("  [REJECTED] {}: {}", source_path.display(), error);
                }
            }
        }
    }

    if unclean > 0 {
        Err(SensorlogCliError::InspectFailed(unclean))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: DecoderConfig, json: bool) -> Result<(), SensorlogCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "sensorlog_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("sensorlog version {}", SENSORLOG_VERSION),
    });

    checks.push(DoctorCheck {
        name: "registry".to_string(),
        status: CheckStatus::Ok,
        message: describe_registry(config.registry),
    });

    checks.push(check_error_dir(&config.error_log_dir));

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        version: SENSORLOG_VERSION.to_string(),
        error_log_dir: config.error_log_dir.clone(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("sensorlog Doctor Report");
        println!("=======================");
        println!("Version:   {}", report.version);
        println!("Error dir: {}", report.error_log_dir.display());
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(SensorlogCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn describe_registry(registry: &SensorKindRegistry) -> String {
    let rows: Vec<String> = registry
        .entries()
        .iter()
        .map(|e| match e.rule {
            Some(LengthRule::Exact(n)) => format!("{}:{}={}", e.code, e.kind, n),
            Some(LengthRule::AtLeast(n)) => format!("{}:{}>={}", e.code, e.kind, n),
            None => format!("{}:{}(not collected)", e.code, e.kind),
        })
        .collect();
    rows.join(", ")
}

fn check_error_dir(dir: &Path) -> DoctorCheck {
    if !dir.exists() {
        return DoctorCheck {
            name: "error_dir".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist yet (created on first failure)", dir.display()),
        };
    }

    let marker = dir.join(".sensorlog-doctor");
    match fs::write(&marker, b"ok").and_then(|_| fs::remove_file(&marker)) {
        Ok(()) => DoctorCheck {
            name: "error_dir".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} is writable", dir.display()),
        },
        Err(e) => DoctorCheck {
            name: "error_dir".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot write to {}: {}", dir.display(), e),
        },
    }
}

fn format_output(
    records: &[DecodedRecord],
    format: &OutputFormat,
) -> Result<String, SensorlogCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut output = String::new();
            for record in records {
                output.push_str(&serde_json::to_string(record)?);
                output.push('\n');
            }
            Ok(output)
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum SensorlogCliError {
    Io(io::Error),
    Decode(DecodeError),
    Json(serde_json::Error),
    Config(ConfigError),
    Aborted {
        records: usize,
        report: serde_json::Value,
    },
    InspectFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for SensorlogCliError {
    fn from(e: io::Error) -> Self {
        SensorlogCliError::Io(e)
    }
}

impl From<DecodeError> for SensorlogCliError {
    fn from(e: DecodeError) -> Self {
        SensorlogCliError::Decode(e)
    }
}

impl From<serde_json::Error> for SensorlogCliError {
    fn from(e: serde_json::Error) -> Self {
        SensorlogCliError::Json(e)
    }
}

impl From<ConfigError> for SensorlogCliError {
    fn from(e: ConfigError) -> Self {
        SensorlogCliError::Config(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<serde_json::Value>,
}

impl From<SensorlogCliError> for CliError {
    fn from(e: SensorlogCliError) -> Self {
        match e {
            SensorlogCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
                report: None,
            },
            SensorlogCliError::Decode(DecodeError::Header(e)) => CliError {
                code: match e.kind() {
                    FormatErrorKind::HeaderSize => "HEADER_SIZE".to_string(),
                    FormatErrorKind::BadMagic => "BAD_MAGIC".to_string(),
                },
                message: e.to_string(),
                hint: Some("The file is not a sensor log or its header is damaged".to_string()),
                report: None,
            },
            SensorlogCliError::Decode(DecodeError::Io(e)) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
                report: None,
            },
            SensorlogCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
                report: None,
            },
            SensorlogCliError::Config(e) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Unset the variable or pass --error-dir".to_string()),
                report: None,
            },
            SensorlogCliError::Aborted { records, report } => CliError {
                code: "ABORTED".to_string(),
                message: format!(
                    "Decode stopped at first corrupt record after {} records",
                    records
                ),
                hint: Some("Records before the failure were written to the output".to_string()),
                report: Some(report),
            },
            SensorlogCliError::InspectFailed(count) => CliError {
                code: "INSPECT_FAILED".to_string(),
                message: format!("{} files did not decode cleanly", count),
                hint: Some("See the error reports under the error directory".to_string()),
                report: None,
            },
            SensorlogCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
                report: None,
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
#[serde(untagged)]
enum InspectEntry {
    Decoded(DecodeSummary),
    Rejected {
        source_path: PathBuf,
        status: &'static str,
        error: String,
    },
}

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    error_log_dir: PathBuf,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
