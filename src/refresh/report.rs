//! Per-job outcomes and the aggregate run report.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::{RefreshError, Stage};

/// What ended up at the destination after a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPayload {
    /// Destination path.
    pub path: PathBuf,
    /// Size in bytes.
    pub bytes: u64,
    /// Lowercase hex SHA-256.
    pub sha256: String,
}

/// Result of one database job. Exactly one exists per job of a run.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub identifier: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Stage that failed, for failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed: Option<InstalledPayload>,
    pub duration_ms: u64,
}

impl JobOutcome {
    pub fn success(identifier: impl Into<String>, installed: InstalledPayload, elapsed: Duration) -> Self {
        Self {
            identifier: identifier.into(),
            succeeded: true,
            error_message: None,
            stage: None,
            installed: Some(installed),
            duration_ms: millis(elapsed),
        }
    }

    pub fn failure(error: &RefreshError, elapsed: Duration) -> Self {
        Self {
            identifier: error.identifier().to_string(),
            succeeded: false,
            error_message: Some(error.to_string()),
            stage: Some(error.stage()),
            installed: None,
            duration_ms: millis(elapsed),
        }
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Aggregate result of a run, in configuration order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<JobOutcome>,
}

impl RunReport {
    /// True only if every job succeeded. An empty run counts as success.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.succeeded)
    }

    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded).count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.succeeded_count()
    }

    /// Process exit status for this run: 0 on success, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.succeeded())
    }

    #[must_use]
    pub fn outcome(&self, identifier: &str) -> Option<&JobOutcome> {
        self.outcomes.iter().find(|o| o.identifier == identifier)
    }

    #[must_use]
    pub fn failures(&self) -> Vec<&JobOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded).collect()
    }
}
