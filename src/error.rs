use std::time::Duration;
use thiserror::Error;

impl From<serde_json::Error> for SentinelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for SentinelError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {waited:?} waiting for the lock on {path}")]
    LockTimeout { path: String, waited: Duration },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SentinelError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Lock contention is transient; everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_is_retryable() {
        let err = SentinelError::LockTimeout {
            path: "chain.json.lock".to_string(),
            waited: Duration::from_millis(50),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("chain.json.lock"));
    }

    #[test]
    fn test_converted_errors_carry_one_prefix() {
        let err = SentinelError::from(config::ConfigError::Message("missing chain_file".to_string()));
        assert_eq!(err.to_string(), "Configuration error: missing chain_file");

        let err = SentinelError::from(serde_json::from_str::<serde_json::Value>("{").unwrap_err());
        assert!(err.to_string().starts_with("Serialization error: "));
        assert!(!err.to_string().contains("serialization error"));
    }

    #[test]
    fn test_io_error_is_not_retryable() {
        let err = SentinelError::io(
            "chain.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_retryable());
        assert!(err.to_string().starts_with("I/O error on chain.json"));
    }
}
