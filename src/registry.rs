//! Sensor kind registry
//!
//! Maps the numeric sensor-type codes written by the watch firmware to
//! symbolic kinds, and records how many values each kind's payload must carry.
//! The standard table is a `static` and is shared by reference between
//! decoders running on different threads.

use serde::{Deserialize, Serialize};

/// Symbolic sensor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorKind {
    Ppg,
    Accelerometer,
    Gyroscope,
    HeartRate,
    Temp,
    AcceAlt,
    Ecg,
    Light,
    StepCounter,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Ppg => "PPG",
            SensorKind::Accelerometer => "ACCELEROMETER",
            SensorKind::Gyroscope => "GYROSCOPE",
            SensorKind::HeartRate => "HEART_RATE",
            SensorKind::Temp => "TEMP",
            SensorKind::AcceAlt => "ACCE_ALT",
            SensorKind::Ecg => "ECG",
            SensorKind::Light => "LIGHT",
            SensorKind::StepCounter => "STEP_COUNTER",
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected payload length for a sensor kind, in values (not bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    Exact(u32),
    AtLeast(u32),
}

impl std::fmt::Display for LengthRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LengthRule::Exact(n) => write!(f, "exactly {n}"),
            LengthRule::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

/// One row of the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry {
    pub code: u32,
    pub kind: SensorKind,
    /// `None` for kinds the device never collects; records of those kinds are
    /// rejected by the validator.
    pub rule: Option<LengthRule>,
}

/// Immutable table of known sensor codes
#[derive(Debug)]
pub struct SensorKindRegistry {
    entries: &'static [RegistryEntry],
}

static STANDARD_ENTRIES: [RegistryEntry; 9] = [
    RegistryEntry {
        code: 1001,
        kind: SensorKind::Ppg,
        rule: Some(LengthRule::Exact(3)),
    },
    RegistryEntry {
        code: 1002,
        kind: SensorKind::Accelerometer,
        rule: None,
    },
    RegistryEntry {
        code: 1003,
        kind: SensorKind::Gyroscope,
        rule: Some(LengthRule::Exact(3)),
    },
    RegistryEntry {
        code: 1004,
        kind: SensorKind::HeartRate,
        rule: Some(LengthRule::AtLeast(2)),
    },
    RegistryEntry {
        code: 1005,
        kind: SensorKind::Temp,
        rule: Some(LengthRule::Exact(2)),
    },
    RegistryEntry {
        code: 1006,
        kind: SensorKind::AcceAlt,
        rule: Some(LengthRule::Exact(3)),
    },
    RegistryEntry {
        code: 1007,
        kind: SensorKind::Ecg,
        rule: None,
    },
    RegistryEntry {
        code: 1008,
        kind: SensorKind::Light,
        rule: None,
    },
    RegistryEntry {
        code: 1009,
        kind: SensorKind::StepCounter,
        rule: None,
    },
];

static STANDARD: SensorKindRegistry = SensorKindRegistry::new(&STANDARD_ENTRIES);

impl SensorKindRegistry {
    pub const fn new(entries: &'static [RegistryEntry]) -> Self {
        Self { entries }
    }

    /// The registry matching the current device firmware
    pub fn standard() -> &'static SensorKindRegistry {
        &STANDARD
    }

    pub fn lookup(&self, code: u32) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.code == code)
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        self.entries
    }

    /// Comma-separated list of known codes, used in failure details
    pub fn codes_description(&self) -> String {
        let codes: Vec<String> = self.entries.iter().map(|e| e.code.to_string()).collect();
        format!("one of [{}]", codes.join(", "))
    }
}
