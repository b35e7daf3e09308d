//! Watch command implementation
//!
//! Runs a sync every `poll_interval_secs` until interrupted. Throttling and
//! network failures are logged and retried on the next cycle; anything else
//! stops the loop with an error.

use anyhow::{Context, Result};
use binance_monitor::{AccountMonitor, HistoryFetcher, Recorder, RunConfig};
use tracing::info;

pub fn run(config: RunConfig, max_cycles: Option<u64>) -> Result<()> {
    let interval = config.poll_interval();
    info!(
        "Starting account monitor, polling every {}s. Press Ctrl+C to exit.",
        interval.as_secs()
    );

    let recorder = Recorder::open(&config.output_path)
        .with_context(|| format!("Failed to open store {}", config.output_path.display()))?;
    let client = super::connect(&config)?;
    let fetcher = HistoryFetcher::from_config(client, &config);
    let mut monitor = AccountMonitor::new(fetcher, recorder);

    monitor
        .run_cycles(max_cycles, interval)
        .context("Account monitor stopped")?;
    Ok(())
}
