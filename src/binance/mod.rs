//! Binance API client for authenticated account history
//! An API key with read permission is required for every endpoint except
//! server time and exchange info.

mod api;
pub mod auth;
mod client;
mod types;

pub use api::*;
pub use auth::{Credentials, SecretString};
pub use client::{classify_error, BinanceClient, ClientConfig, BINANCE_API_BASE};
pub use types::*;
