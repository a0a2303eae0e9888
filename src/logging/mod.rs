//! Structured logging setup
//!
//! Library code only emits `tracing` events. Hosts that want them on stderr
//! call [`init_logging`] once at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::{Error, Result};

/// Global logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub level: String,
    /// Module-specific log levels
    pub module_levels: BTreeMap<String, String>,
    /// Include thread ids, useful when following platform callback threads
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_levels = BTreeMap::new();
        module_levels.insert("ble_host::bridge".to_string(), "info".to_string());
        module_levels.insert("ble_host::platform".to_string(), "info".to_string());

        Self {
            level: "info".to_string(),
            module_levels,
            with_thread_ids: true,
        }
    }
}

/// Build the filter described by `config`
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| Error::Config(format!("Invalid log level {:?}: {}", config.level, e)))?;

    for (module, level) in &config.module_levels {
        let directive = format!("{}={}", module, level)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid log directive for {}: {}", module, e)))?;
        filter = filter.add_directive(directive);
    }

    Ok(filter)
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;

    Registry::default()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(config.with_thread_ids),
        )
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to install subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_builds() {
        assert!(build_filter(&LoggingConfig::default()).is_ok());
    }

    #[test]
    fn test_bad_module_level_rejected() {
        let mut config = LoggingConfig::default();
        config
            .module_levels
            .insert("ble_host::adapter".to_string(), "loud".to_string());
        assert!(matches!(build_filter(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        assert!(matches!(init_logging(&config), Err(Error::Config(_))));
    }
}
