//! Show configured databases and their install status.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use super::common::{CommandContext, OutputFormat};
use crate::config::RefreshConfig;

/// Arguments of `geoip-refresh list`.
#[derive(Args, Debug, Default)]
pub struct ListCommand {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// One row of the listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DatabaseStatus {
    pub edition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Local>>,
}

impl ListCommand {
    /// # Errors
    ///
    /// The configuration file exists but is invalid.
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let config = ctx.load_config().await?;
        let statuses = collect_statuses(&config).await;

        match self.format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&statuses).context("Failed to serialize listing")?
            ),
            OutputFormat::Text => {
                println!("{}", "Configured databases".bold());
                println!("Config: {}\n", ctx.config_path.display());
                for status in &statuses {
                    print_status(status);
                }
            }
        }
        Ok(())
    }
}

/// Inspect the destination of every configured database.
pub async fn collect_statuses(config: &RefreshConfig) -> Vec<DatabaseStatus> {
    let mut statuses = Vec::with_capacity(config.databases.len());
    for entry in &config.databases {
        let path = entry.expanded_path();
        let metadata = match &path {
            Some(p) => tokio::fs::metadata(p).await.ok().filter(std::fs::Metadata::is_file),
            None => None,
        };

        statuses.push(DatabaseStatus {
            edition: entry.edition.clone(),
            path,
            installed: metadata.is_some(),
            size: metadata.as_ref().map(std::fs::Metadata::len),
            modified: metadata.and_then(|m| m.modified().ok()).map(DateTime::<Local>::from),
        });
    }
    statuses
}

fn print_status(status: &DatabaseStatus) {
    println!("  {}", status.edition.cyan().bold());
    match &status.path {
        Some(path) => println!("    path: {}", path.display()),
        None => println!("    path: {}", "(not configured)".yellow()),
    }
    if status.installed {
        let modified = status
            .modified
            .map_or_else(|| "unknown".to_string(), |m| m.format("%Y-%m-%d %H:%M:%S").to_string());
        println!(
            "    {} {} bytes, modified {}",
            "installed".green(),
            status.size.unwrap_or(0),
            modified
        );
    } else {
        println!("    {}", "not installed".dimmed());
    }
}
