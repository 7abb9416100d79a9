//! Temporary artifact tracking with guaranteed cleanup.
//!
//! [`TemporaryArtifacts`] is created at the start of every job. Each stage
//! registers a path *before* it creates it on disk, so a failure halfway through
//! a write still leaves the partial file tracked. At the end of the job the
//! orchestrator calls [`TemporaryArtifacts::sweep`] exactly once; the `Drop`
//! implementation sweeps anything still registered if the job body unwound
//! early (panic or cancelled future).
//!
//! Removal is best-effort: failures are logged and reported in the returned
//! [`CleanupReport`] but never change the job's outcome.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactKind {
    File,
    Directory,
}

#[derive(Debug, Clone)]
struct Artifact {
    path: PathBuf,
    kind: ArtifactKind,
}

/// Result of a sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Artifacts that existed and were removed.
    pub removed: Vec<PathBuf>,
    /// Artifacts that could not be removed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    /// Whether every existing artifact was removed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The set of temporary files and directories created by one job.
#[derive(Debug)]
pub struct TemporaryArtifacts {
    identifier: String,
    artifacts: Vec<Artifact>,
}

impl TemporaryArtifacts {
    /// Start tracking artifacts for the job `identifier`.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            artifacts: Vec::new(),
        }
    }

    /// Track a file that is about to be created.
    pub fn register_file(&mut self, path: impl Into<PathBuf>) {
        self.register(path.into(), ArtifactKind::File);
    }

    /// Track a directory (and everything below it) that is about to be created.
    pub fn register_dir(&mut self, path: impl Into<PathBuf>) {
        self.register(path.into(), ArtifactKind::Directory);
    }

    fn register(&mut self, path: PathBuf, kind: ArtifactKind) {
        if self.artifacts.iter().any(|a| a.path == path) {
            return;
        }
        debug!("[{}] tracking temporary {:?}: {}", self.identifier, kind, path.display());
        self.artifacts.push(Artifact {
            path,
            kind,
        });
    }

    /// Whether `path` is tracked.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.artifacts.iter().any(|a| a.path == path)
    }

    /// Number of tracked artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Remove every tracked artifact still present on disk.
    ///
    /// Artifacts are removed in reverse registration order. The tracked set is
    /// emptied, so a second call (or the eventual drop) is a no-op.
    pub fn sweep(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for artifact in self.artifacts.drain(..).rev() {
            // symlink_metadata: never follow a link out of the working directory
            let Ok(metadata) = std::fs::symlink_metadata(&artifact.path) else {
                continue;
            };

            let result = if metadata.is_dir() {
                std::fs::remove_dir_all(&artifact.path)
            } else {
                std::fs::remove_file(&artifact.path)
            };

            match result {
                Ok(()) => {
                    debug!("[{}] removed {}", self.identifier, artifact.path.display());
                    report.removed.push(artifact.path);
                }
                Err(e) => {
                    warn!(
                        "[{}] failed to remove temporary {:?} {}: {}",
                        self.identifier,
                        artifact.kind,
                        artifact.path.display(),
                        e
                    );
                    report.failed.push((artifact.path, e.to_string()));
                }
            }
        }

        report
    }
}

impl Drop for TemporaryArtifacts {
    fn drop(&mut self) {
        if !self.artifacts.is_empty() {
            let _ = self.sweep();
        }
    }
}
