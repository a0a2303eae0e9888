//! Adapter configuration
//!
//! Loaded from a TOML file (path in `BLE_HOST_CONFIG`), then overridden by
//! `BLE_HOST_*` environment variables and validated.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::adapter::Advertisement;
use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use crate::platform::ThreadingModel;

pub const CONFIG_PATH_VAR: &str = "BLE_HOST_CONFIG";
pub const THREADING_MODEL_VAR: &str = "BLE_HOST_THREADING_MODEL";
pub const COMPLETION_TIMEOUT_VAR: &str = "BLE_HOST_COMPLETION_TIMEOUT";
pub const LOG_LEVEL_VAR: &str = "BLE_HOST_LOG_LEVEL";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Threading mode passed to the runtime by `Adapter::enable`
    pub threading_model: ThreadingModel,
    /// Upper bound on a single async-operation wait; `None` waits forever
    #[serde(with = "humantime_serde")]
    pub completion_timeout: Option<Duration>,
    /// Advertisement used when none has been set explicitly
    pub advertisement: Advertisement,
    pub logging: LoggingConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            threading_model: ThreadingModel::MultiThreaded,
            completion_timeout: None,
            advertisement: Advertisement::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AdapterConfig {
    /// Load configuration from `BLE_HOST_CONFIG` (or defaults) plus environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::load_from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Override configuration with environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(THREADING_MODEL_VAR) {
            self.threading_model = val.parse()?;
        }

        if let Some(val) = lookup(COMPLETION_TIMEOUT_VAR) {
            self.completion_timeout = match val.trim() {
                "none" | "off" | "" => None,
                other => Some(
                    humantime_serde::re::humantime::parse_duration(other)
                        .map_err(|e| Error::Config(format!("Invalid completion timeout: {}", e)))?,
                ),
            };
        }

        if let Some(val) = lookup(LOG_LEVEL_VAR) {
            self.logging.level = val;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.completion_timeout == Some(Duration::ZERO) {
            return Err(Error::Config(
                "Completion timeout must be > 0 (omit it to wait indefinitely)".to_string(),
            ));
        }

        self.advertisement.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_preserve_unbounded_wait() {
        let config = AdapterConfig::default();
        assert_eq!(config.threading_model, ThreadingModel::MultiThreaded);
        assert_eq!(config.completion_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
threading_model = "single_threaded"
completion_timeout = "2s 500ms"

[advertisement]
local_name = "sensor-7"
"#
        )
        .unwrap();

        let config = AdapterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.threading_model, ThreadingModel::SingleThreaded);
        assert_eq!(config.completion_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.advertisement.local_name, "sensor-7");
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = AdapterConfig::load_from_file(Path::new("/nonexistent/ble-host.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (THREADING_MODEL_VAR, "sta"),
            (COMPLETION_TIMEOUT_VAR, "150ms"),
            (LOG_LEVEL_VAR, "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = AdapterConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.threading_model, ThreadingModel::SingleThreaded);
        assert_eq!(config.completion_timeout, Some(Duration::from_millis(150)));
        assert_eq!(config.logging.level, "debug");

        config
            .apply_overrides(|key| (key == COMPLETION_TIMEOUT_VAR).then(|| "none".to_string()))
            .unwrap();
        assert_eq!(config.completion_timeout, None);
    }

    #[test]
    fn test_invalid_overrides() {
        let mut config = AdapterConfig::default();
        assert!(config
            .apply_overrides(|key| (key == COMPLETION_TIMEOUT_VAR).then(|| "soon".to_string()))
            .is_err());
        assert!(config
            .apply_overrides(|key| (key == THREADING_MODEL_VAR).then(|| "both".to_string()))
            .is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = AdapterConfig::default();
        config.completion_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
