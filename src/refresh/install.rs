//! Atomic installation of the located payload.

use std::path::Path;

use tracing::debug;

use super::error::RefreshError;
use super::job::DatabaseJob;
use super::report::InstalledPayload;
use crate::utils::fs::atomic_copy;

/// Replace `job`'s destination with `payload`.
///
/// The bytes go to a temporary file next to the destination (same filesystem),
/// which is then renamed over it, so readers of the destination never observe a
/// partial file. The destination's parent directory is created if missing.
///
/// # Errors
///
/// [`RefreshError::Install`]; the destination still holds its previous content.
pub fn install(job: &DatabaseJob, payload: &Path) -> Result<InstalledPayload, RefreshError> {
    let destination = job.destination();

    let summary = atomic_copy(payload, destination).map_err(|e| RefreshError::Install {
        identifier: job.identifier().to_string(),
        path: destination.display().to_string(),
        reason: format!("{e:#}"),
    })?;

    debug!(
        "[{}] installed {} bytes (sha256 {}) at {}",
        job.identifier(),
        summary.bytes,
        summary.sha256,
        destination.display()
    );

    Ok(InstalledPayload {
        path: destination.to_path_buf(),
        bytes: summary.bytes,
        sha256: summary.sha256,
    })
}
