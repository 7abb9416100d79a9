//! Units of refresh work.
//!
//! A [`JobRequest`] is what configuration asks for: an identifier plus whatever
//! destination and credential could be found for it. The orchestrator validates a
//! request into a [`DatabaseJob`], which is immutable for the rest of the job.

use std::fmt;
use std::path::{Path, PathBuf};

use super::error::RefreshError;

/// Default download URL, parameterised by edition, credential and archive suffix.
pub const DEFAULT_DOWNLOAD_URL: &str = "https://download.maxmind.com/app/geoip_download?edition_id={edition}&license_key={license_key}&suffix={suffix}";

/// Archive format requested from the publisher.
pub const DEFAULT_ARCHIVE_SUFFIX: &str = "tar.gz";

/// Extension of the payload file inside the archive.
pub const DEFAULT_PAYLOAD_EXTENSION: &str = "mmdb";

const REDACTED: &str = "***";

/// One configured database, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Publisher edition identifier, e.g. `GeoLite2-City`.
    pub identifier: String,
    /// Where the installed file must end up.
    pub destination: Option<PathBuf>,
    /// Credential used to build the download URL.
    pub license_key: Option<String>,
}

impl JobRequest {
    /// Convenience constructor for a fully specified request.
    pub fn new(
        identifier: impl Into<String>,
        destination: impl Into<PathBuf>,
        license_key: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            destination: Some(destination.into()),
            license_key: Some(license_key.into()),
        }
    }
}

/// A validated unit of refresh work.
#[derive(Debug, Clone)]
pub struct DatabaseJob {
    identifier: String,
    destination: PathBuf,
    working_dir: PathBuf,
    download_url: String,
    license_key: String,
}

impl DatabaseJob {
    /// Validate a request against a URL template.
    ///
    /// # Errors
    ///
    /// [`RefreshError::Configuration`] when the identifier is unusable as a file
    /// name prefix, the destination or credential is missing, the destination is
    /// not absolute, or the rendered URL does not parse.
    pub fn from_request(
        request: &JobRequest,
        url_template: &str,
        archive_suffix: &str,
    ) -> Result<Self, RefreshError> {
        let identifier = request.identifier.clone();
        let config_error = |message: String| RefreshError::Configuration {
            identifier: identifier.clone(),
            message,
        };

        validate_identifier(&identifier).map_err(config_error)?;

        let destination = request
            .destination
            .clone()
            .ok_or_else(|| config_error("no destination path configured".to_string()))?;

        if !destination.is_absolute() {
            return Err(config_error(format!(
                "destination path must be absolute: {}",
                destination.display()
            )));
        }

        let working_dir = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                config_error(format!(
                    "destination path has no parent directory: {}",
                    destination.display()
                ))
            })?;

        if destination.file_name().is_none() {
            return Err(config_error(format!(
                "destination path does not name a file: {}",
                destination.display()
            )));
        }

        let license_key = request
            .license_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| config_error("no license key configured".to_string()))?;

        let download_url = url_template
            .replace("{edition}", &identifier)
            .replace("{license_key}", &license_key)
            .replace("{suffix}", archive_suffix);

        reqwest::Url::parse(&download_url).map_err(|e| {
            config_error(format!(
                "invalid download URL {}: {e}",
                redact(&download_url, &license_key)
            ))
        })?;

        Ok(Self {
            identifier,
            destination,
            working_dir,
            download_url,
            license_key,
        })
    }

    /// Publisher edition identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Final install location.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Scratch directory for this job's temporary artifacts (destination's parent).
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Download URL including the credential. Never log this.
    #[must_use]
    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    /// Download URL safe for logs and error messages.
    #[must_use]
    pub fn redacted_url(&self) -> String {
        redact(&self.download_url, &self.license_key)
    }

    /// Replace every occurrence of the credential in `text`.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        redact(text, &self.license_key)
    }

    /// Path the compressed archive is downloaded to.
    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.working_dir.join(format!("temp_{}.tar.gz", self.identifier))
    }

    /// Path the gzip layer is decompressed to.
    #[must_use]
    pub fn intermediate_path(&self) -> PathBuf {
        self.working_dir.join(format!("temp_{}.tar", self.identifier))
    }

    /// Name prefix of the directory the archive unpacks into (`<identifier>_`).
    #[must_use]
    pub fn extraction_prefix(&self) -> String {
        format!("{}_", self.identifier)
    }

    /// File name of the payload inside the extraction directory.
    #[must_use]
    pub fn payload_file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.identifier, extension)
    }
}

fn redact(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        text.to_string()
    } else {
        text.replace(secret, REDACTED)
    }
}

/// Identifiers end up in file names and a glob pattern, so keep them plain.
fn validate_identifier(identifier: &str) -> Result<(), String> {
    if identifier.trim().is_empty() {
        return Err("database identifier is empty".to_string());
    }
    if identifier.starts_with('.') {
        return Err(format!("identifier '{identifier}' must not start with '.'"));
    }
    if let Some(c) =
        identifier.chars().find(|c| matches!(c, '/' | '\\' | '*' | '?' | '[' | ']' | '\0'))
    {
        return Err(format!("identifier '{identifier}' contains invalid character '{c}'"));
    }
    Ok(())
}

/// Per-job state machine, used for progress and log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Not started.
    Pending,
    /// Downloading.
    Fetching,
    /// Decompressing, extracting and locating the payload.
    Unpacking,
    /// Replacing the destination.
    Installing,
    /// Destination replaced.
    Succeeded,
    /// Destination untouched.
    Failed,
}

impl JobState {
    /// Whether the job reached a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Unpacking => "unpacking",
            Self::Installing => "installing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
