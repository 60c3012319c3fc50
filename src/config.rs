//! Decoder configuration
//!
//! | Variable              | Default  | Description                          |
//! |-----------------------|----------|--------------------------------------|
//! | `SENSORLOG_ERROR_DIR` | `errors` | Root of the day-bucketed error logs  |

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::registry::SensorKindRegistry;

/// Environment variable naming the sideband error log root
pub const ERROR_DIR_VAR: &str = "SENSORLOG_ERROR_DIR";

/// Default sideband error log root, relative to the working directory
pub const DEFAULT_ERROR_DIR: &str = "errors";

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Reports land in `<error_log_dir>/<YYMMDD>/<file name>.errors.jsonl`
    pub error_log_dir: PathBuf,
    pub registry: &'static SensorKindRegistry,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            error_log_dir: PathBuf::from(DEFAULT_ERROR_DIR),
            registry: SensorKindRegistry::standard(),
        }
    }
}

impl DecoderConfig {
    pub fn with_error_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.error_log_dir = dir.into();
        self
    }

    /// Build a config from the environment, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyVar`] if `SENSORLOG_ERROR_DIR` is set to an
    /// empty string.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(dir) = lookup(ERROR_DIR_VAR) {
            if dir.trim().is_empty() {
                return Err(ConfigError::EmptyVar(ERROR_DIR_VAR));
            }
            config.error_log_dir = PathBuf::from(dir);
        }
        Ok(config)
    }
}
