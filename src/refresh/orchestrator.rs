//! Runs the refresh pipeline for a batch of databases.
//!
//! Every job is isolated: a failure at any stage of one database is recorded in
//! its [`JobOutcome`] and the remaining databases are still processed. Jobs run
//! with bounded concurrency (`max_parallel`), and the report lists outcomes in
//! request order regardless of completion order.
//!
//! Per-job flow:
//!
//! ```text
//! validate -> fetch -> decompress -> extract -> locate -> install
//!     \________\__________\____________\__________\_________\__ sweep temporaries
//! ```
//!
//! Cancellation is cooperative and checked when a job starts. A job that has
//! begun runs to completion so the destination is never left mid-replace; jobs
//! that had not started are reported as cancelled.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::cleanup::TemporaryArtifacts;
use super::error::RefreshError;
use super::fetch::ArchiveFetcher;
use super::install::install;
use super::job::{
    DEFAULT_ARCHIVE_SUFFIX, DEFAULT_DOWNLOAD_URL, DEFAULT_PAYLOAD_EXTENSION, DatabaseJob,
    JobRequest, JobState,
};
use super::report::{InstalledPayload, JobOutcome, RunReport};
use super::unpack::unpack;
use crate::constants::{DEFAULT_FETCH_RETRIES, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_PARALLEL};
use crate::utils::progress::MultiProgress;

/// Knobs shared by every job of a run.
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Download URL template with `{edition}`, `{license_key}` and `{suffix}`.
    pub url_template: String,
    /// Value of `{suffix}` in the URL and extension of the downloaded archive.
    pub archive_suffix: String,
    /// Extension of the payload file inside the archive, without the dot.
    pub payload_extension: String,
    /// Per-attempt transfer timeout; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Retries for transient download failures.
    pub retries: usize,
    /// Maximum number of databases processed at once (at least 1).
    pub max_parallel: usize,
    /// Where download bars are drawn; hidden by default.
    pub progress: MultiProgress,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_DOWNLOAD_URL.to_string(),
            archive_suffix: DEFAULT_ARCHIVE_SUFFIX.to_string(),
            payload_extension: DEFAULT_PAYLOAD_EXTENSION.to_string(),
            timeout: Some(DEFAULT_FETCH_TIMEOUT),
            retries: DEFAULT_FETCH_RETRIES,
            max_parallel: DEFAULT_MAX_PARALLEL,
            progress: MultiProgress::hidden(),
        }
    }
}

/// Drives [`DatabaseJob`]s through the pipeline and aggregates their outcomes.
#[derive(Debug)]
pub struct Refresher {
    settings: RefreshSettings,
    fetcher: ArchiveFetcher,
    cancelled: Arc<AtomicBool>,
}

impl Refresher {
    /// Build a refresher for `settings`.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(settings: RefreshSettings) -> Result<Self> {
        let fetcher =
            ArchiveFetcher::new(settings.timeout, settings.retries, settings.progress.clone())?;
        Ok(Self {
            settings,
            fetcher,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared flag; storing `true` cancels jobs that have not started yet.
    #[must_use]
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Cancel every job that has not started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Refresh every requested database and report one outcome per request.
    ///
    /// Never fails as a whole; inspect [`RunReport::succeeded`].
    pub async fn run(&self, requests: Vec<JobRequest>) -> RunReport {
        let started_at = Utc::now();
        let parallelism = self.settings.max_parallel.max(1);
        info!("Refreshing {} database(s), up to {} at a time", requests.len(), parallelism);

        // Two jobs with the same identifier would share temporary paths
        let mut seen = HashSet::new();
        let duplicates: Vec<bool> =
            requests.iter().map(|r| !seen.insert(r.identifier.clone())).collect();

        let outcomes: Vec<JobOutcome> = stream::iter(requests.iter().zip(duplicates))
            .map(|(request, duplicate)| async move {
                if duplicate {
                    let error = RefreshError::Configuration {
                        identifier: request.identifier.clone(),
                        message: "identifier listed more than once in this run".to_string(),
                    };
                    warn!("{error}");
                    return JobOutcome::failure(&error, Duration::ZERO);
                }
                self.run_job(request).await
            })
            .buffered(parallelism)
            .collect()
            .await;

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        info!(
            "Refresh finished: {} succeeded, {} failed",
            report.succeeded_count(),
            report.failed_count()
        );
        report
    }

    /// Run a single job to its terminal state. Temporary artifacts are swept
    /// whether the job succeeds or fails.
    pub async fn run_job(&self, request: &JobRequest) -> JobOutcome {
        let started = Instant::now();
        let identifier = request.identifier.as_str();

        if self.is_cancelled() {
            let error = RefreshError::Cancelled {
                identifier: identifier.to_string(),
            };
            warn!("{error}");
            return JobOutcome::failure(&error, started.elapsed());
        }

        let mut artifacts = TemporaryArtifacts::new(identifier);
        let result = self.execute(request, &mut artifacts).await;

        let cleanup = artifacts.sweep();
        if !cleanup.is_clean() {
            warn!(
                "[{}] {} temporary artifact(s) could not be removed",
                identifier,
                cleanup.failed.len()
            );
        }

        let elapsed = started.elapsed();
        match result {
            Ok(installed) => {
                transition(identifier, JobState::Succeeded);
                info!(
                    "[{}] installed {} ({} bytes) in {:.1}s",
                    identifier,
                    installed.path.display(),
                    installed.bytes,
                    elapsed.as_secs_f64()
                );
                JobOutcome::success(identifier, installed, elapsed)
            }
            Err(error) => {
                transition(identifier, JobState::Failed);
                warn!("{error}");
                JobOutcome::failure(&error, elapsed)
            }
        }
    }

    async fn execute(
        &self,
        request: &JobRequest,
        artifacts: &mut TemporaryArtifacts,
    ) -> Result<InstalledPayload, RefreshError> {
        let job = DatabaseJob::from_request(
            request,
            &self.settings.url_template,
            &self.settings.archive_suffix,
        )?;

        transition(job.identifier(), JobState::Fetching);
        let archive = job.archive_path();
        artifacts.register_file(&archive);
        self.fetcher.fetch(&job, &archive).await?;

        transition(job.identifier(), JobState::Unpacking);
        let unpacked = {
            // The blocking task owns the tracker while it runs; if it panics the
            // tracker's drop still sweeps what was registered
            let mut tracked =
                std::mem::replace(artifacts, TemporaryArtifacts::new(job.identifier()));
            let blocking_job = job.clone();
            let extension = self.settings.payload_extension.clone();
            let (tracked, result) = tokio::task::spawn_blocking(move || {
                let result = unpack(&blocking_job, &archive, &extension, &mut tracked);
                (tracked, result)
            })
            .await
            .map_err(|e| RefreshError::Extraction {
                identifier: job.identifier().to_string(),
                reason: format!("unpack task failed: {e}"),
            })?;
            *artifacts = tracked;
            result?
        };

        transition(job.identifier(), JobState::Installing);
        let payload: PathBuf = unpacked.payload;
        let install_job = job.clone();
        tokio::task::spawn_blocking(move || install(&install_job, &payload))
            .await
            .map_err(|e| RefreshError::Install {
                identifier: job.identifier().to_string(),
                path: job.destination().display().to_string(),
                reason: format!("install task failed: {e}"),
            })?
    }
}

fn transition(identifier: &str, state: JobState) {
    debug!("[{identifier}] -> {state}");
}
