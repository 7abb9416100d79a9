//! Common utilities for CLI commands

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::RefreshConfig;

/// Output format shared by `update` and `list`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, colored text.
    #[default]
    Text,
    /// A single JSON document on stdout.
    Json,
}

/// Settings resolved from global flags, handed to every subcommand.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Resolved configuration file location.
    pub config_path: PathBuf,
    /// Whether progress bars may be drawn.
    pub show_progress: bool,
}

impl CommandContext {
    /// Resolve the configuration path from the global `--config` flag.
    ///
    /// # Errors
    ///
    /// No explicit path was given and the platform has no configuration
    /// directory.
    pub fn new(config_path: Option<&Path>, show_progress: bool) -> Result<Self> {
        Ok(Self {
            config_path: RefreshConfig::resolve_path(config_path)?,
            show_progress,
        })
    }

    /// Load the configuration, falling back to defaults if the file is absent.
    ///
    /// # Errors
    ///
    /// The file exists but is unreadable or invalid.
    pub async fn load_config(&self) -> Result<RefreshConfig> {
        RefreshConfig::load_or_default(&self.config_path).await
    }
}
