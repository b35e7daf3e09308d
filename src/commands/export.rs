//! Export command implementation

use anyhow::{Context, Result};
use binance_monitor::{Recorder, RunConfig};
use std::path::PathBuf;
use tracing::info;

pub fn run(config: RunConfig, output: PathBuf) -> Result<()> {
    info!(
        "Exporting {} to {}",
        config.output_path.display(),
        output.display()
    );

    if !config.output_path.exists() {
        anyhow::bail!(
            "No store at {}. Run `binance-monitor sync` first",
            config.output_path.display()
        );
    }

    let recorder = Recorder::open(&config.output_path)
        .with_context(|| format!("Failed to open store {}", config.output_path.display()))?;
    let count = recorder
        .export_csv(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Exported {} records to {}", count, output.display());
    Ok(())
}
