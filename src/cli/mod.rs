//! Command-line interface for geoip-refresh.
//!
//! # Commands
//!
//! - `update` - download and install the configured databases
//! - `list` - show configured databases and what is installed
//! - `config` - create, show or locate the configuration file
//!
//! # Global Options
//!
//! - `--verbose` - debug logging
//! - `--quiet` - errors only
//! - `--config <PATH>` - configuration file (also `GEOIP_REFRESH_CONFIG`)
//! - `--no-progress` - no download progress bars
//!
//! Logs go to stderr; `RUST_LOG`, when set, overrides the verbosity flags.
//!
//! # Examples
//!
//! ```bash
//! geoip-refresh update
//! geoip-refresh update --only GeoLite2-City --max-parallel 2
//! geoip-refresh --config /etc/geoip-refresh.toml list --format json
//! geoip-refresh config init
//! ```

pub mod common;
pub mod config;
pub mod list;
pub mod update;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use self::common::CommandContext;

/// Keep local GeoIP databases up to date.
#[derive(Parser)]
#[command(
    name = "geoip-refresh",
    about = "Download and atomically install GeoIP databases",
    version,
    long_about = "geoip-refresh downloads the configured GeoIP database editions, unpacks them and \
                  replaces the installed files atomically. A failure on one database never \
                  affects the others."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "GEOIP_REFRESH_CONFIG")]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and install databases
    Update(update::UpdateCommand),

    /// Show configured databases and their install status
    List(list::ListCommand),

    /// Manage the configuration file
    Config(config::ConfigCommand),
}

impl Cli {
    /// Initialise logging and run the selected command.
    ///
    /// # Errors
    ///
    /// Whatever the command returns; a run with failed jobs is an error.
    pub async fn execute(self) -> Result<()> {
        init_logging(self.log_directive());

        let ctx = CommandContext::new(self.config.as_deref(), !self.no_progress && !self.quiet)?;

        match self.command {
            Commands::Update(cmd) => cmd.execute(&ctx).await,
            Commands::List(cmd) => cmd.execute(&ctx).await,
            Commands::Config(cmd) => cmd.execute(&ctx).await,
        }
    }

    /// Default filter directive for the verbosity flags.
    #[must_use]
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "geoip_refresh=debug"
        } else if self.quiet {
            "error"
        } else {
            "geoip_refresh=info"
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `default_directive`.
fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
