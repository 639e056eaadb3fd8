//! kvlog CLI - inspect, verify and replay transaction logs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kvlog_core::LogConfig;
use std::path::PathBuf;

mod backend;
mod commands;

use backend::Backend;

#[derive(Parser)]
#[command(name = "kvlog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Storage backend of the log
    #[arg(short, long, value_enum, default_value_t = Backend::File)]
    backend: Backend,

    /// Path to the log file or database (default depends on the backend)
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// JSON configuration file; overrides --backend and --path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capacity of the write queue
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every persisted event
    Events,

    /// Check the log for corrupt records and ordering violations
    Verify {
        /// Truncate a torn final record before verifying (file backend)
        #[arg(long)]
        repair: bool,
    },

    /// Rebuild the key-value state from the log and print it
    Replay,

    /// Replay the log and print the value of one key
    Get { key: String },

    /// Append a Put event
    Put { key: String, value: String },

    /// Append a Delete event
    Delete { key: String },
}

impl Cli {
    fn log_config(&self) -> Result<LogConfig> {
        let config = match &self.config {
            Some(path) => LogConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => {
                let path = self
                    .path
                    .clone()
                    .unwrap_or_else(|| self.backend.default_path());
                self.backend.config(path)
            }
        };

        let config = match self.queue_capacity {
            Some(capacity) => config.with_queue_capacity(capacity),
            None => config,
        };
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.log_config()?;

    match cli.command {
        Commands::Events => commands::events::execute(config)?,
        Commands::Verify { repair } => commands::verify::execute(config, repair)?,
        Commands::Replay => commands::replay::execute(config)?,
        Commands::Get { key } => commands::replay::get(config, &key)?,
        Commands::Put { key, value } => commands::mutate::put(config, &key, &value)?,
        Commands::Delete { key } => commands::mutate::delete(config, &key)?,
    }

    Ok(())
}
