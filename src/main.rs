//! Binance account monitor - main entry point
//!
//! This binary provides five subcommands:
//! - sync: fetch new account history once and record it (default)
//! - watch: keep syncing on an interval
//! - account: show current balances
//! - export: copy the stored history to a CSV file
//! - init: save API credentials

use anyhow::{Context, Result};
use binance_monitor::RunConfig;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "binance-monitor")]
#[command(about = "Record Binance account history (trades, deposits, withdrawals, balances) to local storage", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch new account history once and record it (default)
    Sync {
        /// Trading pairs to poll (comma-separated). E.g., "BTCUSDT,ETHBTC"
        #[arg(short, long)]
        symbols: Option<String>,

        /// Poll every trading pair, ignoring the blacklist
        #[arg(long)]
        force_all: bool,
    },

    /// Sync every poll interval until interrupted
    Watch {
        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,
    },

    /// Display account info and non-zero balances
    Account,

    /// Export the stored history to a CSV file
    Export {
        /// Output file
        #[arg(short, long, default_value = "account_history_export.csv")]
        output: PathBuf,
    },

    /// Enter API credentials and save them to the credentials file
    Init,
}

fn setup_logging(verbose: bool, log_dir: &Path, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    if file_only {
        // Rotates at midnight: app.log.YYYY-MM-DD
        let file_appender = tracing_appender::rolling::daily(log_dir, "app.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        // Keep the console clean for the progress bar
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_appender = tracing_appender::rolling::daily(log_dir, "app.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    }

    info!("{}", "*".repeat(60));
    info!("binance-monitor {} ({})", env!("CARGO_PKG_VERSION"), command_name);
    info!("Log directory: {}", log_dir.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env may hold BINANCE_API_KEY / BINANCE_API_SECRET
    dotenv::dotenv().ok();

    let config = RunConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let command = cli.command.unwrap_or(Commands::Sync {
        symbols: None,
        force_all: false,
    });

    let (command_name, file_only) = match &command {
        Commands::Sync { .. } => ("sync", true), // File-only for clean progress bar
        Commands::Watch { .. } => ("watch", false),
        Commands::Account => ("account", false),
        Commands::Export { .. } => ("export", false),
        Commands::Init => ("init", true),
    };

    setup_logging(cli.verbose, &config.log_dir, command_name, file_only)?;
    match &config.loaded_from {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file, using defaults"),
    }
    info!(
        "Store: {} | kinds: {:?} | symbols: {}",
        config.output_path.display(),
        config.record_kinds,
        if config.symbols.is_empty() {
            "all trading".to_string()
        } else {
            config.symbols.join(",")
        }
    );

    match command {
        Commands::Sync { symbols, force_all } => commands::sync::run(config, symbols, force_all),
        Commands::Watch { max_cycles } => commands::watch::run(config, max_cycles),
        Commands::Account => commands::account::run(config),
        Commands::Export { output } => commands::export::run(config, output),
        Commands::Init => commands::init::run(config),
    }
}
