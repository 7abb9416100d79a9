//! Job-scoped error taxonomy for the refresh pipeline.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The pipeline stage a job was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The job never started (run cancelled).
    Pending,
    /// Validating the job's configuration.
    Configure,
    /// Downloading the compressed archive.
    Fetch,
    /// Removing the gzip layer.
    Decompress,
    /// Unpacking the tar archive.
    Extract,
    /// Finding the extraction directory and payload file.
    Locate,
    /// Replacing the destination file.
    Install,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Configure => "configure",
            Self::Fetch => "fetch",
            Self::Decompress => "decompress",
            Self::Extract => "extract",
            Self::Locate => "locate",
            Self::Install => "install",
        };
        f.write_str(name)
    }
}

/// A failure of a single database job.
///
/// Every variant carries the database identifier; [`RefreshError::stage`] names
/// the stage, so an operator can tell credential problems from publisher format
/// changes from local disk trouble.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// Missing or invalid configuration; the job is skipped without touching disk.
    #[error("Configuration error for {identifier}: {message}")]
    Configuration {
        /// Database identifier
        identifier: String,
        /// What is missing or wrong
        message: String,
    },

    /// Transport or HTTP failure while downloading the archive.
    #[error("Failed to download {identifier}: {reason}")]
    Fetch {
        /// Database identifier
        identifier: String,
        /// Transport error or HTTP status
        reason: String,
    },

    /// The gzip layer could not be removed.
    #[error("Failed to decompress {identifier} archive: {reason}")]
    Decompression {
        /// Database identifier
        identifier: String,
        /// Decoder error
        reason: String,
    },

    /// The tar archive could not be unpacked.
    #[error("Failed to extract {identifier} archive: {reason}")]
    Extraction {
        /// Database identifier
        identifier: String,
        /// Archive error
        reason: String,
    },

    /// The archive unpacked, but not into the expected layout.
    #[error("{identifier} payload not found: {reason}")]
    PayloadNotFound {
        /// Database identifier
        identifier: String,
        /// Which part of the naming convention did not match
        reason: String,
    },

    /// Writing or renaming the new file into place failed.
    #[error("Failed to install {identifier} to {path}: {reason}")]
    Install {
        /// Database identifier
        identifier: String,
        /// Destination path
        path: String,
        /// I/O error
        reason: String,
    },

    /// The run was cancelled before this job started.
    #[error("Update of {identifier} cancelled before it started")]
    Cancelled {
        /// Database identifier
        identifier: String,
    },
}

impl RefreshError {
    /// Database identifier the error belongs to.
    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Self::Configuration { identifier, .. }
            | Self::Fetch { identifier, .. }
            | Self::Decompression { identifier, .. }
            | Self::Extraction { identifier, .. }
            | Self::PayloadNotFound { identifier, .. }
            | Self::Install { identifier, .. }
            | Self::Cancelled { identifier } => identifier,
        }
    }

    /// Stage at which the error occurred.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Configuration { .. } => Stage::Configure,
            Self::Fetch { .. } => Stage::Fetch,
            Self::Decompression { .. } => Stage::Decompress,
            Self::Extraction { .. } => Stage::Extract,
            Self::PayloadNotFound { .. } => Stage::Locate,
            Self::Install { .. } => Stage::Install,
            Self::Cancelled { .. } => Stage::Pending,
        }
    }
}
