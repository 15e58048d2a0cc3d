//! # chatsync
//!
//! CLI tool for exercising the chatsync realtime sync layer offline.
//!
//! ## Commands
//!
//! - `replay`: Feed recorded change payloads through the invalidation path
//! - `config`: Show the effective configuration
//!
//! ## Example
//!
//! ```bash
//! # Print the invalidations a recorded session would cause
//! chatsync replay events.jsonl --user 42
//!
//! # Show configuration with defaults filled in
//! chatsync config --config chatsync.toml
//! ```

use anyhow::{Context, Result};
use chatsync_client::Config;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{config as show_config, replay};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "chatsync.toml";

/// CLI tool for exercising the chatsync realtime sync layer.
#[derive(Parser, Debug)]
#[command(name = "chatsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: ./chatsync.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay change payloads (one JSON object per line) and print invalidations
    Replay {
        /// File of newline-delimited JSON change payloads
        events: PathBuf,

        /// Session user id
        #[arg(long, short)]
        user: String,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay { events, user } => {
            replay::run(&config, &events, &user).await?;
        }
        Commands::Config => {
            show_config::run(&config)?;
        }
    }

    Ok(())
}

/// Load the explicit config file, else `./chatsync.toml`, else defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path).context("Failed to load configuration"),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                Config::from_file(default).context("Failed to load configuration")
            } else {
                Ok(Config::default())
            }
        }
    }
}
