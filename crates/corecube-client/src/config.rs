//! Client configuration.
//!
//! Loaded from YAML:
//!
//! ```yaml
//! connection_timeout_secs: 5.0
//! scan_timeout_secs: 10.0
//! auto_restart_scan: true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a [`ClientConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// Offending field name.
        field: &'static str,
        /// Offending value.
        value: f64,
    },
}

/// Settings shared by every session the registry creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Seconds a connect attempt may take before it times out.
    pub connection_timeout_secs: f64,
    /// Seconds `wait_for_cube` scans before giving up (0 = no limit).
    pub scan_timeout_secs: f64,
    /// Restart a requested scan when the radio powers back on.
    pub auto_restart_scan: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connection_timeout_secs: 5.0,
            scan_timeout_secs: 0.0,
            auto_restart_scan: true,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Reject timeouts that are negative, non-finite, or too large for a
    /// [`Duration`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("connection_timeout_secs", self.connection_timeout_secs),
            ("scan_timeout_secs", self.scan_timeout_secs),
        ] {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::InvalidValue { field, value });
            }
        }
        Ok(())
    }

    /// Connection timeout as a [`Duration`].
    pub fn connection_timeout(&self) -> Duration {
        saturating_secs(self.connection_timeout_secs)
    }

    /// Scan timeout, or `None` when scans are unbounded.
    pub fn scan_timeout(&self) -> Option<Duration> {
        (self.scan_timeout_secs > 0.0).then(|| saturating_secs(self.scan_timeout_secs))
    }
}

/// Seconds to a [`Duration`], clamped to `ZERO..=MAX`. NaN maps to zero.
fn saturating_secs(secs: f64) -> Duration {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}
