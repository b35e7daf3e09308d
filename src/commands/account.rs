//! Account command implementation

use anyhow::{Context, Result};
use binance_monitor::binance::AccountApi;
use binance_monitor::RunConfig;
use chrono::DateTime;
use itertools::Itertools;

pub fn run(config: RunConfig) -> Result<()> {
    let client = super::connect(&config)?;
    let account = config
        .retry_policy()
        .run("account", || client.account())
        .context("Failed to fetch account info")?;

    let updated = DateTime::from_timestamp_millis(account.update_time)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| account.update_time.to_string());

    println!("\n{}", "=".repeat(60));
    println!("ACCOUNT INFO");
    println!("{}", "=".repeat(60));
    println!(
        "Account type:       {}",
        account.account_type.as_deref().unwrap_or("-")
    );
    println!("Can trade:          {}", account.can_trade);
    println!("Updated:            {}", updated);
    println!("{}", "-".repeat(60));
    println!("{:<10} {:>22} {:>22}", "Asset", "Free", "Locked");

    let held = account
        .balances
        .iter()
        .filter(|b| !b.total().is_zero())
        .sorted_by(|a, b| a.asset.cmp(&b.asset))
        .collect::<Vec<_>>();
    for balance in &held {
        println!(
            "{:<10} {:>22} {:>22}",
            balance.asset,
            balance.free.normalize(),
            balance.locked.normalize()
        );
    }
    if held.is_empty() {
        println!("(no non-zero balances)");
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
