//! Error handling for geoip-refresh
//!
//! Two layers of errors exist in this crate:
//!
//! 1. [`RefreshError`](crate::refresh::RefreshError) - job-scoped failures of the
//!    refresh pipeline. These never escape a job; the orchestrator turns them into
//!    [`JobOutcome`](crate::refresh::JobOutcome) values.
//! 2. [`GeoipError`] - command-level failures (unreadable configuration, unknown
//!    edition on the command line, a run with failed jobs). These travel as
//!    [`anyhow::Error`] up to `main`, which renders them through
//!    [`user_friendly_error`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use geoip_refresh::core::{GeoipError, ErrorContext, user_friendly_error};
//!
//! let err = anyhow::Error::from(GeoipError::UnknownDatabase {
//!     edition: "GeoLite2-Planet".to_string(),
//! });
//! let ctx = user_friendly_error(err);
//! ctx.display(); // colored error + suggestion on stderr
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

use crate::refresh::Stage;

/// Command-level error types.
#[derive(Error, Debug, Clone)]
pub enum GeoipError {
    /// Configuration file could not be parsed
    #[error("Failed to parse configuration file {file}")]
    ConfigParseError {
        /// Path of the configuration file
        file: String,
        /// Parser message
        reason: String,
    },

    /// Configuration is structurally valid TOML but semantically invalid
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// An edition requested with `--only` is not configured
    #[error("Database '{edition}' is not configured")]
    UnknownDatabase {
        /// The requested edition identifier
        edition: String,
    },

    /// At least one job of a run failed
    #[error("{failed} of {total} database(s) failed to update")]
    RunFailed {
        /// Number of failed jobs
        failed: usize,
        /// Number of jobs in the run
        total: usize,
    },

    /// Insufficient permissions for a filesystem operation
    #[error("Permission denied: {operation} on {path}")]
    PermissionDenied {
        /// What was attempted
        operation: String,
        /// Where it was attempted
        path: String,
    },

    /// Generic filesystem failure
    #[error("File system error: {operation} on {path}")]
    FileSystemError {
        /// What was attempted
        operation: String,
        /// Where it was attempted
        path: String,
    },

    /// Anything else
    #[error("{message}")]
    Other {
        /// Full error message
        message: String,
    },
}

/// An error plus optional details and a suggestion, for CLI display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: GeoipError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: GeoipError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error (printed in green).
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error (printed in yellow).
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-friendly [`ErrorContext`].
///
/// Recognizes [`GeoipError`] and [`std::io::Error`]; everything else is
/// rendered with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(geoip_error) = error.downcast_ref::<GeoipError>() {
        return create_error_context(geoip_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(GeoipError::PermissionDenied {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Run with a user that can write to the database directory, or fix its ownership")
                .with_details("The database directory must be writable by geoip-refresh");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(GeoipError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    // Generic error - include the full error chain
    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(GeoipError::Other {
        message,
    })
}

fn create_error_context(error: GeoipError) -> ErrorContext {
    match &error {
        GeoipError::ConfigParseError { file, reason } => ErrorContext::new(error.clone())
            .with_suggestion(format!(
                "Fix the TOML syntax in {file}, or regenerate it with 'geoip-refresh config init --force'"
            ))
            .with_details(reason.clone()),

        GeoipError::UnknownDatabase { edition } => ErrorContext::new(error.clone())
            .with_suggestion(format!(
                "Add a [[databases]] entry with edition = \"{edition}\" to the configuration, or check the spelling"
            ))
            .with_details("Run 'geoip-refresh list' to see the configured databases"),

        GeoipError::RunFailed { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Re-run with --verbose for per-stage diagnostics")
            .with_details("Databases that failed keep their previous on-disk version"),

        GeoipError::PermissionDenied { operation, path } => ErrorContext::new(error.clone())
            .with_suggestion("Use 'sudo' or check file permissions with 'ls -la'")
            .with_details(format!("Cannot {operation} due to insufficient permissions on {path}")),

        _ => ErrorContext::new(error.clone()),
    }
}

/// What an operator can do about a job that failed at `stage`.
///
/// Printed under each failed database by `update`.
#[must_use]
pub const fn stage_suggestion(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::Configure => Some(
            "Set a destination path for every [[databases]] entry and provide a license key via --license-key or MAXMIND_LICENSE_KEY",
        ),
        Stage::Fetch => Some(
            "Check the license key and network connectivity; HTTP 401 usually means an invalid license key",
        ),
        Stage::Decompress | Stage::Extract | Stage::Locate => {
            Some("The publisher's archive format may have changed; inspect the archive manually")
        }
        Stage::Install => Some("Check free disk space and permissions of the destination directory"),
        Stage::Pending => None,
    }
}
