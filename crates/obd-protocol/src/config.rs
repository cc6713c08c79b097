//! Engine configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `OBD_*` environment variables (`OBD_BAUD_RATE=38400`,
//! `OBD_RETRY__MAX_ATTEMPTS=3`).

use crate::codec::DEFAULT_TOKEN_CAPACITY;
use crate::dtc::DtcNotation;
use crate::error::ObdError;
use crate::retry::RetryPolicy;
use crate::transport::DEFAULT_READ_TIMEOUT_MS;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Protocol engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Serial device path
    pub device: String,

    pub baud_rate: u32,

    /// Require and strip a trailing checksum byte on every reply
    pub enforce_checksum: bool,

    /// Convert decoded values to imperial units
    pub imperial_units: bool,

    /// Wait for the adapter prompt this long (milliseconds)
    pub read_timeout_ms: u64,

    /// Maximum reply tokens kept per request
    pub token_capacity: usize,

    pub dtc_notation: DtcNotation,

    pub retry: RetryPolicy,

    /// Default filter for the log subscriber
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            enforce_checksum: false,
            imperial_units: false,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            token_capacity: DEFAULT_TOKEN_CAPACITY,
            dtc_notation: DtcNotation::Decimal,
            retry: RetryPolicy::disabled(),
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load defaults, then `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ObdError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("OBD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ObdError> {
        if self.baud_rate == 0 {
            return Err(ObdError::Config("baud_rate must be non-zero".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(ObdError::Config("read_timeout_ms must be non-zero".into()));
        }
        // Header plus at least one payload byte
        if self.token_capacity < 3 {
            return Err(ObdError::Config("token_capacity must be at least 3".into()));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
