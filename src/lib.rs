//! Binance Account Monitor
//!
//! Polls the Binance REST API with the user's API key and records the
//! account's trades, deposits, withdrawals and balance snapshots to a local
//! CSV or SQLite store. Every run only adds history that is not stored yet.

pub mod binance;
pub mod common;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod monitor;
pub mod recorder;
pub mod store;
pub mod types;

pub use config::RunConfig;
pub use error::{ConfigError, ExchangeError, MonitorError, StorageError};
pub use fetcher::HistoryFetcher;
pub use monitor::{AccountMonitor, SyncOutcome};
pub use recorder::{RecordSummary, Recorder};
pub use types::*;
