//! Error types and handling for the BLE host adapter

use std::time::Duration;

use thiserror::Error;

use crate::platform::AsyncStatus;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Adapter error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Async operation failed with status {} ({})", .status, .status.code())]
    AsyncOperationFailed { status: AsyncStatus },

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Identity resolution error: {0}")]
    IdentityResolution(String),

    #[error("Completion handler registration failed: {0}")]
    Registration(String),

    #[error("Async operation did not complete within {0:?}")]
    Timeout(Duration),

    #[error("Advertisement watcher error: {0}")]
    Watcher(String),

    #[error("Adapter not enabled")]
    NotEnabled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blocking task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Join(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(format!("Failed to parse config: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_failure_names_status() {
        let err = Error::AsyncOperationFailed {
            status: AsyncStatus::Canceled,
        };
        let msg = err.to_string();
        assert!(msg.contains("Canceled"));
        assert!(msg.contains('2'));
    }

    #[test]
    fn test_not_implemented_is_distinct() {
        let err = Error::NotImplemented("address".to_string());
        assert!(matches!(err, Error::NotImplemented(_)));
        assert_eq!(err.to_string(), "Not implemented: address");
    }
}
