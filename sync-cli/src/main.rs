//! # sync-cli
//!
//! Operator tool for notesync.
//!
//! ## Commands
//!
//! - `inspect`: Show the operations queued in an account's mirror
//! - `migrate`: Rewrite a mirror at the current schema version
//! - `check-config`: Validate a sync configuration file
//!
//! ## Example
//!
//! ```bash
//! # What is still waiting to be sent for an account?
//! notesync inspect --account user@example.com
//!
//! # Upgrade a mirror left by an older release
//! notesync migrate --file queue-user_example_com.json
//!
//! # Validate configuration before deploying it
//! notesync check-config notesync.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{check_config, inspect, migrate, MirrorTarget};

/// Operator tool for notesync.
#[derive(Parser, Debug)]
#[command(name = "notesync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding per-account queue mirrors
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the operations queued in a mirror
    Inspect {
        /// Account whose mirror to read (inside the data directory)
        #[arg(long, conflicts_with = "file")]
        account: Option<String>,

        /// Mirror file to read
        #[arg(long, conflicts_with = "account")]
        file: Option<PathBuf>,

        /// Print operations as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a mirror at the current schema version
    Migrate {
        /// Account whose mirror to migrate (inside the data directory)
        #[arg(long, conflicts_with = "file")]
        account: Option<String>,

        /// Mirror file to migrate
        #[arg(long, conflicts_with = "account")]
        file: Option<PathBuf>,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a sync configuration file
    CheckConfig {
        /// Path to the TOML file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so --json output stays parseable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            account,
            file,
            json,
        } => {
            let target = MirrorTarget::resolve(cli.data_dir, account, file)?;
            inspect::run(&target.mirror(), json).await?;
        }
        Commands::Migrate {
            account,
            file,
            dry_run,
        } => {
            let target = MirrorTarget::resolve(cli.data_dir, account, file)?;
            migrate::run(&target.mirror(), dry_run).await?;
        }
        Commands::CheckConfig { path } => {
            check_config::run(&path)?;
        }
    }

    Ok(())
}

/// Get the default data directory for notesync.
pub(crate) fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "notesync", "notesync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
