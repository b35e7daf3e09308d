//! Sync command implementation

use anyhow::{Context, Result};
use binance_monitor::{AccountMonitor, HistoryFetcher, RecordKind, Recorder, RunConfig};
use tracing::info;

pub fn run(mut config: RunConfig, symbols: Option<String>, force_all: bool) -> Result<()> {
    info!("Starting sync");

    if let Some(symbols) = symbols {
        info!("Overriding symbols to: {}", symbols);
        config.symbols = symbols.split(',').map(|s| s.to_string()).collect();
    }

    let recorder = Recorder::open(&config.output_path)
        .with_context(|| format!("Failed to open store {}", config.output_path.display()))?;
    let client = super::connect(&config)?;

    let fetcher = HistoryFetcher::from_config(client, &config)
        .force_all(force_all)
        .with_progress(true);
    let mut monitor = AccountMonitor::new(fetcher, recorder);

    let outcome = monitor.sync().context("Sync failed")?;
    let recorder = monitor.recorder();

    println!("\n{}", "=".repeat(60));
    println!("SYNC RESULTS");
    println!("{}", "=".repeat(60));
    println!("Store:              {}", recorder.path().display());
    println!("Symbols scanned:    {}", outcome.symbols_scanned);
    println!("Records fetched:    {}", outcome.fetched);
    println!("New records:        {}", outcome.summary.inserted);
    println!("Already stored:     {}", outcome.summary.duplicates);
    println!("Total stored:       {}", outcome.stored_total);
    for kind in RecordKind::ALL {
        println!(
            "  {:<17} {}",
            format!("{}:", kind),
            recorder.count_by_kind(kind)
        );
    }
    if !outcome.skipped_symbols.is_empty() {
        println!("Skipped symbols:    {}", outcome.skipped_symbols.join(", "));
    }
    if !outcome.blacklisted_with_trades.is_empty() {
        println!(
            "Blacklisted with trades (remove from `blacklist`): {}",
            outcome.blacklisted_with_trades.join(", ")
        );
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
