//! Error taxonomy for the monitor
//!
//! Exchange failures are split by how the caller should react: authentication
//! problems are fatal, throttling and transport failures are retried, anything
//! else the exchange rejects is reported as-is.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while talking to the exchange
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited by exchange: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("Binance API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ExchangeError {
    /// Whether the same request may succeed if tried again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::RateLimit { .. } | ExchangeError::Network(_)
        )
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Network(format!("request timed out: {}", err))
        } else if err.is_connect() {
            ExchangeError::Network(format!("failed to connect to Binance: {}", err))
        } else if err.is_decode() {
            ExchangeError::Decode(err.to_string())
        } else {
            ExchangeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Decode(format!("JSON parsing failed: {}", err))
    }
}

/// Errors raised by the record store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while loading configuration or credentials
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("no API credentials found (set BINANCE_API_KEY/BINANCE_API_SECRET or run `binance-monitor init`)")]
    MissingCredentials,
}

/// Any error that ends a monitor run
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MonitorError {
    /// Whether a later polling cycle may succeed without user intervention
    pub fn is_retryable(&self) -> bool {
        match self {
            MonitorError::Exchange(e) => e.is_retryable(),
            MonitorError::Storage(_) | MonitorError::Config(_) => false,
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ExchangeError::Network("reset".into()).is_retryable());
        assert!(ExchangeError::RateLimit {
            message: "slow down".into(),
            retry_after: None,
        }
        .is_retryable());
        assert!(!ExchangeError::Auth("bad key".into()).is_retryable());
        assert!(!ExchangeError::Api {
            code: -1121,
            message: "Invalid symbol.".into(),
        }
        .is_retryable());
        assert!(!ExchangeError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn test_monitor_error_retryable() {
        let err: MonitorError = ExchangeError::Network("timeout".into()).into();
        assert!(err.is_retryable());

        let err: MonitorError = StorageError::Corrupt {
            path: "x.csv".into(),
            reason: "bad row".into(),
        }
        .into();
        assert!(!err.is_retryable());
    }
}
