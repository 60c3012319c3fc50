//! Record prefix validation
//!
//! Checks run in a fixed order and the first failing check decides the
//! reported field.

use crate::registry::{LengthRule, RegistryEntry, SensorKindRegistry};
use crate::report::FailureDetail;
use crate::types::RawRecordPrefix;

const TS_MIN: u64 = 1_000_000_000_000;
const TS_MAX: u64 = 2_000_000_000_000;
const TS_DIGITS: usize = 13;

/// A prefix that passed every check, paired with its registry entry
#[derive(Debug, Clone, Copy)]
pub struct ValidatedPrefix<'r> {
    pub prefix: RawRecordPrefix,
    pub entry: &'r RegistryEntry,
}

pub struct RecordValidator<'r> {
    registry: &'r SensorKindRegistry,
}

impl<'r> RecordValidator<'r> {
    pub fn new(registry: &'r SensorKindRegistry) -> Self {
        Self { registry }
    }

    pub fn validate(&self, prefix: RawRecordPrefix) -> Result<ValidatedPrefix<'r>, FailureDetail> {
        let entry = self
            .registry
            .lookup(prefix.sensor_type)
            .ok_or_else(|| FailureDetail::SensorType {
                observed: prefix.sensor_type,
                expected: self.registry.codes_description(),
            })?;

        check_collected_ts(prefix.collected_ts)?;

        if prefix.accuracy != 0 {
            return Err(FailureDetail::Accuracy {
                observed: prefix.accuracy,
                expected: 0,
            });
        }

        check_value_count(entry, prefix.value_count)?;

        Ok(ValidatedPrefix { prefix, entry })
    }
}

fn decimal_digits(n: u64) -> usize {
    n.checked_ilog10().map_or(1, |d| d as usize + 1)
}

fn check_collected_ts(ts: u64) -> Result<(), FailureDetail> {
    let digits = decimal_digits(ts);
    if digits == TS_DIGITS && (TS_MIN..=TS_MAX).contains(&ts) {
        return Ok(());
    }
    Err(FailureDetail::CollectedTs {
        observed: ts,
        digits,
        expected: format!("13-digit epoch millis in [{TS_MIN}, {TS_MAX}]"),
    })
}

fn check_value_count(entry: &RegistryEntry, value_count: u32) -> Result<(), FailureDetail> {
    match entry.rule {
        Some(LengthRule::Exact(n)) if value_count == n => Ok(()),
        Some(LengthRule::AtLeast(n)) if value_count >= n => Ok(()),
        Some(rule @ LengthRule::Exact(_)) => Err(FailureDetail::DataSize {
            observed: value_count,
            expected: format!("{rule} values for {}", entry.kind),
        }),
        Some(rule @ LengthRule::AtLeast(_)) => Err(FailureDetail::DataSizeMin {
            observed: value_count,
            expected: format!("{rule} values for {}", entry.kind),
        }),
        None => Err(FailureDetail::DataSize {
            observed: value_count,
            expected: format!("no payload rule, {} is not collected", entry.kind),
        }),
    }
}
