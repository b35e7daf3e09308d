//! Configuration management
//!
//! Handles loading the JSON run configuration, environment overrides for the
//! API credentials, and the saved credentials file.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::binance::{ClientConfig, Credentials, SecretString, BINANCE_API_BASE};
use crate::common::RetryPolicy;
use crate::error::ConfigError;
use crate::types::RecordKind;

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "binance-monitor.json";

/// How far back transfer history is scanned when nothing is stored yet
pub const DEFAULT_HISTORY_DAYS: i64 = 90;

/// Binance rejects recvWindow values above one minute
const MAX_RECV_WINDOW_MS: u64 = 60_000;

/// Configuration for one invocation. Loaded once, never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub api_key: Option<SecretString>,
    pub api_secret: Option<SecretString>,
    /// Fallback credentials file written by `binance-monitor init`
    pub credentials_path: PathBuf,
    pub poll_interval_secs: u64,
    /// Store file; `.db`/`.sqlite` selects the SQLite store, anything else CSV
    pub output_path: PathBuf,
    pub base_url: String,
    /// Pairs to poll for trades; empty means every TRADING symbol
    pub symbols: Vec<String>,
    /// Pairs skipped when `symbols` is empty
    pub blacklist: Vec<String>,
    pub record_kinds: Vec<RecordKind>,
    /// Lower bound for transfer history when the store has none
    pub history_start: Option<NaiveDate>,
    pub recv_window_ms: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub log_dir: PathBuf,
    /// File this configuration was read from, `None` for built-in defaults
    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            api_key: None,
            api_secret: None,
            credentials_path: PathBuf::from("config/api_cred.json"),
            poll_interval_secs: 300,
            output_path: PathBuf::from("data/account_history.csv"),
            base_url: BINANCE_API_BASE.to_string(),
            symbols: Vec::new(),
            blacklist: Vec::new(),
            record_kinds: RecordKind::ALL.to_vec(),
            history_start: None,
            recv_window_ms: 5_000,
            request_timeout_secs: 30,
            max_retries: 3,
            log_dir: PathBuf::from("logs"),
            loaded_from: None,
        }
    }
}

impl RunConfig {
    /// Load configuration from a JSON file, apply env overrides and validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: RunConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.loaded_from = Some(path.to_path_buf());
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => {
                debug!("No config file found, using defaults");
                let mut config = RunConfig::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// `BINANCE_API_KEY` / `BINANCE_API_SECRET` take precedence over the file
    pub fn apply_env_overrides(&mut self) {
        self.apply_credential_overrides(
            std::env::var("BINANCE_API_KEY").ok(),
            std::env::var("BINANCE_API_SECRET").ok(),
        );
    }

    pub fn apply_credential_overrides(&mut self, api_key: Option<String>, api_secret: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(SecretString::new(key));
        }
        if let Some(secret) = api_secret.filter(|s| !s.trim().is_empty()) {
            self.api_secret = Some(SecretString::new(secret));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.recv_window_ms == 0 || self.recv_window_ms > MAX_RECV_WINDOW_MS {
            return Err(ConfigError::Invalid(format!(
                "recv_window_ms must be between 1 and {}",
                MAX_RECV_WINDOW_MS
            )));
        }
        if self.record_kinds.is_empty() {
            return Err(ConfigError::Invalid(
                "record_kinds must name at least one kind".to_string(),
            ));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output_path is empty".to_string()));
        }
        reqwest::Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("base_url {}: {}", self.base_url, e)))?;
        if let Some(start) = self.history_start {
            if start > Utc::now().date_naive() {
                return Err(ConfigError::Invalid(format!(
                    "history_start {} is in the future",
                    start
                )));
            }
        }
        Ok(())
    }

    /// Resolve credentials: config/env first, then the credentials file
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        if let (Some(key), Some(secret)) = (&self.api_key, &self.api_secret) {
            let creds = Credentials::new(key.expose_secret(), secret.expose_secret());
            if creds.is_complete() {
                return Ok(creds);
            }
        }

        if self.credentials_path.exists() {
            let file = CredentialsFile::load(&self.credentials_path)?;
            let creds = Credentials::new(file.binance_key, file.binance_secret);
            if creds.is_complete() {
                info!(
                    "API credentials loaded from {}",
                    self.credentials_path.display()
                );
                return Ok(creds);
            }
            return Err(ConfigError::Invalid(format!(
                "{} does not contain an API key and secret; fix the file or delete it and run `binance-monitor init`",
                self.credentials_path.display()
            )));
        }

        Err(ConfigError::MissingCredentials)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn wants(&self, kind: RecordKind) -> bool {
        self.record_kinds.contains(&kind)
    }

    /// Start of the transfer history scan when there is no cursor yet
    pub fn history_start_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.history_start {
            Some(date) => date.and_hms_opt(0, 0, 0).map_or(now, |dt| dt.and_utc()),
            None => now - ChronoDuration::days(DEFAULT_HISTORY_DAYS),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_base_url(self.base_url.clone())
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_recv_window(self.recv_window_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_retries(self.max_retries)
    }
}

/// On-disk credentials: `{ "binance_key": ..., "binance_secret": ... }`
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsFile {
    pub binance_key: String,
    pub binance_secret: String,
}

impl CredentialsFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the file (unencrypted), creating parent directories. Owner-only on Unix.
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}
