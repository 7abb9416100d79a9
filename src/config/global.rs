//! The user-wide configuration file.
//!
//! ```toml
//! license_key = "YOUR_LICENSE_KEY"
//! timeout_secs = 300
//! retries = 2
//! max_parallel = 1
//!
//! [[databases]]
//! edition = "GeoLite2-Country"
//! path = "/var/lib/GeoIP/GeoLite2-Country.mmdb"
//!
//! [[databases]]
//! edition = "GeoLite2-City"
//! path = "~/GeoIP/GeoLite2-City.mmdb"
//! license_key = "a-different-account-key"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::{DEFAULT_FETCH_RETRIES, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_PARALLEL};
use crate::core::GeoipError;
use crate::refresh::{
    DEFAULT_ARCHIVE_SUFFIX, DEFAULT_DOWNLOAD_URL, DEFAULT_PAYLOAD_EXTENSION, JobRequest,
    RefreshSettings,
};
use crate::utils::fs::atomic_write;
use crate::utils::progress::MultiProgress;

/// Editions refreshed when no configuration file exists.
pub const DEFAULT_EDITIONS: [&str; 3] = ["GeoLite2-Country", "GeoLite2-City", "GeoLite2-ASN"];

const REDACTED: &str = "***";

/// One database to keep up to date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseEntry {
    /// Publisher edition identifier.
    pub edition: String,

    /// Install location; `~` is expanded. Left unset, the job fails with a
    /// configuration error naming the edition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Overrides the top-level `license_key` for this database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
}

impl DatabaseEntry {
    #[must_use]
    pub fn new(edition: impl Into<String>) -> Self {
        Self {
            edition: edition.into(),
            path: None,
            license_key: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// The configured path with `~` expanded.
    #[must_use]
    pub fn expanded_path(&self) -> Option<PathBuf> {
        self.path.as_deref().map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }
}

/// Settings loaded from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshConfig {
    /// Publisher credential shared by all databases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,

    /// URL template; `{edition}`, `{license_key}` and `{suffix}` are substituted.
    #[serde(default = "default_download_url")]
    pub download_url: String,

    #[serde(default = "default_archive_suffix")]
    pub archive_suffix: String,

    #[serde(default = "default_payload_extension")]
    pub payload_extension: String,

    /// Per-attempt download timeout in seconds; 0 disables the timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for transient download failures.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Databases refreshed concurrently.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    #[serde(default = "default_databases")]
    pub databases: Vec<DatabaseEntry>,
}

fn default_download_url() -> String {
    DEFAULT_DOWNLOAD_URL.to_string()
}

fn default_archive_suffix() -> String {
    DEFAULT_ARCHIVE_SUFFIX.to_string()
}

fn default_payload_extension() -> String {
    DEFAULT_PAYLOAD_EXTENSION.to_string()
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}

const fn default_retries() -> usize {
    DEFAULT_FETCH_RETRIES
}

const fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL
}

fn default_databases() -> Vec<DatabaseEntry> {
    DEFAULT_EDITIONS.iter().map(|e| DatabaseEntry::new(*e)).collect()
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            license_key: None,
            download_url: default_download_url(),
            archive_suffix: default_archive_suffix(),
            payload_extension: default_payload_extension(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            max_parallel: default_max_parallel(),
            databases: default_databases(),
        }
    }
}

impl RefreshConfig {
    /// `<config_dir>/geoip-refresh/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no configuration directory.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine configuration directory"))?;
        Ok(config_dir.join("geoip-refresh").join("config.toml"))
    }

    /// The explicit path if given, otherwise [`Self::default_path`].
    ///
    /// # Errors
    ///
    /// See [`Self::default_path`].
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::default_path(),
        }
    }

    /// Load from `path`, or defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// The file exists but cannot be read, parsed or validated.
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load_from(path).await
        } else {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load and validate the configuration at `path`.
    ///
    /// # Errors
    ///
    /// The file cannot be read, is not valid TOML for this schema, or fails
    /// [`Self::validate`].
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content).map_err(|e| GeoipError::ConfigParseError {
            file: path.display().to_string(),
            reason: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration, readable by the owner only.
    ///
    /// # Errors
    ///
    /// Serialization or the atomic write fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        atomic_write(path, content.as_bytes())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Reject configurations no run could honour.
    ///
    /// # Errors
    ///
    /// [`GeoipError::ConfigError`] for duplicate or empty editions, or a zero
    /// `max_parallel`.
    pub fn validate(&self) -> Result<(), GeoipError> {
        if self.max_parallel == 0 {
            return Err(GeoipError::ConfigError {
                message: "max_parallel must be at least 1".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for entry in &self.databases {
            if entry.edition.trim().is_empty() {
                return Err(GeoipError::ConfigError {
                    message: "database entry with an empty edition".to_string(),
                });
            }
            if !seen.insert(entry.edition.as_str()) {
                return Err(GeoipError::ConfigError {
                    message: format!("edition '{}' is listed more than once", entry.edition),
                });
            }
        }
        Ok(())
    }

    /// Look up a configured database by edition.
    #[must_use]
    pub fn database(&self, edition: &str) -> Option<&DatabaseEntry> {
        self.databases.iter().find(|d| d.edition == edition)
    }

    /// Build job requests in configuration order.
    ///
    /// `only` restricts the run to the named editions; an empty slice selects
    /// every database. The credential for each job is, in order of precedence,
    /// `license_key_override`, the entry's own key, then the top-level key.
    ///
    /// # Errors
    ///
    /// [`GeoipError::UnknownDatabase`] if `only` names an edition that is not
    /// configured.
    pub fn to_requests(
        &self,
        license_key_override: Option<&str>,
        only: &[String],
    ) -> Result<Vec<JobRequest>, GeoipError> {
        if let Some(unknown) = only.iter().find(|e| self.database(e).is_none()) {
            return Err(GeoipError::UnknownDatabase {
                edition: unknown.clone(),
            });
        }

        Ok(self
            .databases
            .iter()
            .filter(|d| only.is_empty() || only.contains(&d.edition))
            .map(|d| JobRequest {
                identifier: d.edition.clone(),
                destination: d.expanded_path(),
                license_key: license_key_override
                    .map(str::to_string)
                    .or_else(|| d.license_key.clone())
                    .or_else(|| self.license_key.clone()),
            })
            .collect())
    }

    /// Pipeline settings from this configuration, with optional overrides.
    #[must_use]
    pub fn refresh_settings(
        &self,
        timeout_secs: Option<u64>,
        max_parallel: Option<usize>,
        progress: MultiProgress,
    ) -> RefreshSettings {
        let timeout_secs = timeout_secs.unwrap_or(self.timeout_secs);
        RefreshSettings {
            url_template: self.download_url.clone(),
            archive_suffix: self.archive_suffix.clone(),
            payload_extension: self.payload_extension.clone(),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            retries: self.retries,
            max_parallel: max_parallel.unwrap_or(self.max_parallel).max(1),
            progress,
        }
    }

    /// A copy with every credential replaced by `***`.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.license_key.is_some() {
            copy.license_key = Some(REDACTED.to_string());
        }
        for entry in &mut copy.databases {
            if entry.license_key.is_some() {
                entry.license_key = Some(REDACTED.to_string());
            }
        }
        copy
    }

    /// Starting point written by `config init`.
    #[must_use]
    pub fn init_example() -> Self {
        Self {
            license_key: Some("YOUR_LICENSE_KEY".to_string()),
            databases: DEFAULT_EDITIONS
                .iter()
                .map(|e| DatabaseEntry::new(*e).with_path(format!("~/GeoIP/{e}.mmdb")))
                .collect(),
            ..Self::default()
        }
    }
}
