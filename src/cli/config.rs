//! Manage the configuration file.
//!
//! ```bash
//! geoip-refresh config init          # write an example file
//! geoip-refresh config init --force  # overwrite an existing one
//! geoip-refresh config show          # effective settings, credentials masked
//! geoip-refresh config path          # where the file lives
//! ```

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use super::common::CommandContext;
use crate::config::RefreshConfig;

/// Arguments of `geoip-refresh config`.
#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// Defaults to `show`
    #[command(subcommand)]
    command: Option<ConfigSubcommands>,
}

#[derive(Subcommand, Debug)]
enum ConfigSubcommands {
    /// Write an example configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration with credentials masked
    Show,

    /// Print the configuration file location
    Path,
}

impl ConfigCommand {
    /// # Errors
    ///
    /// The file cannot be written, read or parsed.
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        match self.command {
            Some(ConfigSubcommands::Init {
                force,
            }) => init(ctx, force).await,
            Some(ConfigSubcommands::Show) | None => show(ctx).await,
            Some(ConfigSubcommands::Path) => {
                println!("{}", ctx.config_path.display());
                Ok(())
            }
        }
    }
}

async fn init(ctx: &CommandContext, force: bool) -> Result<()> {
    let path = &ctx.config_path;
    if !force && tokio::fs::try_exists(path).await.unwrap_or(false) {
        anyhow::bail!(
            "Configuration already exists at {}; use --force to overwrite",
            path.display()
        );
    }

    let config = RefreshConfig::init_example();
    config.save_to(path)?;

    println!("{} {}", "Created configuration at".green(), path.display());
    println!("\n{}", "Next steps:".yellow());
    println!("  1. Replace YOUR_LICENSE_KEY with your publisher license key");
    println!("  2. Point each database path at where your service reads it");
    println!("  3. Run `geoip-refresh update`");
    Ok(())
}

async fn show(ctx: &CommandContext) -> Result<()> {
    let config = ctx.load_config().await?;
    let exists = tokio::fs::try_exists(&ctx.config_path).await.unwrap_or(false);

    println!("{}", "Configuration".bold());
    if exists {
        println!("Location: {}\n", ctx.config_path.display());
    } else {
        println!("Location: {} {}\n", ctx.config_path.display(), "(not found, using defaults)".yellow());
    }

    let rendered =
        toml::to_string_pretty(&config.redacted()).context("Failed to serialize configuration")?;
    println!("{rendered}");
    Ok(())
}
