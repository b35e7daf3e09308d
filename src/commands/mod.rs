//! Command implementations

pub mod account;
pub mod export;
pub mod init;
pub mod sync;
pub mod watch;

use anyhow::{Context, Result};
use binance_monitor::binance::{BinanceClient, Credentials};
use binance_monitor::RunConfig;
use tracing::{info, warn};

/// Authenticated client with its clock synced to the exchange
pub fn connect(config: &RunConfig) -> Result<BinanceClient> {
    let credentials: Credentials = config
        .credentials()
        .context("Failed to load API credentials")?;
    info!("Using API key {}", credentials.api_key());

    let client = BinanceClient::new(config.client_config(), Some(credentials))
        .context("Failed to create Binance client")?;

    // Skew only matters for signed calls; a failure here surfaces on the first one
    if let Err(e) = config
        .retry_policy()
        .run("server time", || client.sync_time())
    {
        warn!("Could not sync clock with Binance: {}", e);
    }

    Ok(client)
}
