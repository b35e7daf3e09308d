//! Init command implementation
//!
//! Prompts for the API key and secret and saves them (unencrypted) to the
//! credentials file.

use anyhow::{Context, Result};
use binance_monitor::config::CredentialsFile;
use binance_monitor::RunConfig;
use std::io::{self, BufRead, Write};
use tracing::info;

fn prompt(stdin: &mut impl BufRead, message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut line = String::new();
    stdin.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

pub fn run(config: RunConfig) -> Result<()> {
    let path = &config.credentials_path;
    let mut stdin = io::stdin().lock();

    if path.exists() {
        let answer = prompt(
            &mut stdin,
            &format!("{} already exists. Overwrite? [y/N] ", path.display()),
        )?;
        if !answer.to_uppercase().starts_with('Y') {
            println!("Keeping existing credentials");
            return Ok(());
        }
    } else {
        println!("Credentials will be saved (unencrypted) to {}", path.display());
        let answer = prompt(&mut stdin, "Enter them now? [Y/n] ")?;
        if !(answer.is_empty() || answer.to_uppercase().starts_with('Y')) {
            println!("Cannot monitor the account without credentials!");
            println!(
                "Save them as JSON {{\"binance_key\": ..., \"binance_secret\": ...}} at {} \
                 or set BINANCE_API_KEY and BINANCE_API_SECRET",
                path.display()
            );
            return Ok(());
        }
    }

    let binance_key = prompt(&mut stdin, "Enter Binance API key: ")?;
    let binance_secret = prompt(&mut stdin, "Enter Binance API secret: ")?;
    if binance_key.is_empty() || binance_secret.is_empty() {
        anyhow::bail!("API key and secret must both be non-empty");
    }

    CredentialsFile {
        binance_key,
        binance_secret,
    }
    .save(path)
    .with_context(|| format!("Failed to save credentials to {}", path.display()))?;

    info!("API credentials saved to {}", path.display());
    println!("Credentials saved to {}", path.display());
    Ok(())
}
