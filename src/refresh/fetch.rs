//! Archive download.
//!
//! The response body is streamed chunk by chunk into the target file, so memory
//! use is bounded by the chunk size regardless of how large the City database
//! grows. Transient failures (connect errors, timeouts, HTTP 5xx/429, truncated
//! bodies) are retried with exponential backoff; other HTTP errors fail at once.
//!
//! The fetcher never deletes what it wrote. A partial archive is left for the
//! job's [`TemporaryArtifacts`](super::cleanup::TemporaryArtifacts), which the
//! caller registers the target with before calling [`ArchiveFetcher::fetch`].

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

use super::error::RefreshError;
use super::job::DatabaseJob;
use crate::constants::{
    FETCH_BACKOFF_BASE_MS, FETCH_BACKOFF_FACTOR, FETCH_BUFFER_CAPACITY, MAX_ERROR_BODY_EXCERPT,
    MAX_FETCH_BACKOFF, USER_AGENT,
};
use crate::utils::progress::{MultiProgress, ProgressBar};

#[derive(Debug)]
enum FetchFailure {
    Transient(String),
    Permanent(String),
}

impl FetchFailure {
    const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    fn into_reason(self) -> String {
        match self {
            Self::Transient(reason) | Self::Permanent(reason) => reason,
        }
    }
}

/// Streams remote archives to local files.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: reqwest::Client,
    retries: usize,
    progress: MultiProgress,
}

impl ArchiveFetcher {
    /// Build a fetcher whose requests (headers and body) must complete within
    /// `timeout`, retrying transient failures up to `retries` times.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed (e.g. no TLS backend).
    pub fn new(timeout: Option<Duration>, retries: usize, progress: MultiProgress) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            retries,
            progress,
        })
    }

    /// Download `job`'s archive to `target`, returning the number of bytes written.
    ///
    /// Creates the working directory if needed.
    ///
    /// # Errors
    ///
    /// [`RefreshError::Fetch`] with the HTTP status or transport error. The
    /// credential is redacted from the message.
    pub async fn fetch(&self, job: &DatabaseJob, target: &Path) -> Result<u64, RefreshError> {
        let fetch_error = |reason: String| RefreshError::Fetch {
            identifier: job.identifier().to_string(),
            reason: job.redact(&reason),
        };

        tokio::fs::create_dir_all(job.working_dir()).await.map_err(|e| {
            fetch_error(format!(
                "failed to create working directory {}: {e}",
                job.working_dir().display()
            ))
        })?;

        debug!("[{}] downloading {}", job.identifier(), job.redacted_url());

        let strategy = ExponentialBackoff::from_millis(FETCH_BACKOFF_BASE_MS)
            .factor(FETCH_BACKOFF_FACTOR)
            .max_delay(MAX_FETCH_BACKOFF)
            .take(self.retries);

        let attempts = AtomicUsize::new(0);
        RetryIf::spawn(
            strategy,
            || self.attempt(job, target, attempts.fetch_add(1, Ordering::Relaxed) + 1),
            |failure: &FetchFailure| {
                if failure.is_transient() {
                    warn!(
                        "[{}] download attempt failed, retrying: {}",
                        job.identifier(),
                        job.redact(&format!("{failure:?}"))
                    );
                    true
                } else {
                    false
                }
            },
        )
        .await
        .map_err(|failure| fetch_error(failure.into_reason()))
    }

    async fn attempt(
        &self,
        job: &DatabaseJob,
        target: &Path,
        attempt: usize,
    ) -> Result<u64, FetchFailure> {
        let mut response =
            self.client.get(job.download_url()).send().await.map_err(classify_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt = error_body_excerpt(&body);
            let reason = if excerpt.is_empty() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {excerpt}")
            };
            return Err(if is_transient_status(status) {
                FetchFailure::Transient(reason)
            } else {
                FetchFailure::Permanent(reason)
            });
        }

        let expected = response.content_length();

        // File::create truncates whatever a previous attempt left behind
        let file = tokio::fs::File::create(target).await.map_err(|e| {
            FetchFailure::Permanent(format!("failed to create {}: {e}", target.display()))
        })?;
        let mut writer = BufWriter::with_capacity(FETCH_BUFFER_CAPACITY, file);

        let bar = self.progress.add_download(expected, job.identifier());
        if attempt > 1 {
            bar.set_message(format!("attempt {attempt}"));
        }
        // Dropping the bar on a failed attempt clears it as well
        let written = stream_body(&mut response, &mut writer, &bar, target).await?;
        bar.finish_and_clear();

        if let Some(expected) = expected {
            if written != expected {
                return Err(FetchFailure::Transient(format!(
                    "truncated transfer: received {written} of {expected} bytes"
                )));
            }
        }

        debug!("[{}] downloaded {} bytes to {}", job.identifier(), written, target.display());
        Ok(written)
    }
}

async fn stream_body(
    response: &mut reqwest::Response,
    writer: &mut BufWriter<tokio::fs::File>,
    bar: &ProgressBar,
    target: &Path,
) -> Result<u64, FetchFailure> {
    let mut written: u64 = 0;

    while let Some(chunk) = response.chunk().await.map_err(classify_reqwest)? {
        writer.write_all(&chunk).await.map_err(|e| {
            FetchFailure::Permanent(format!("failed to write {}: {e}", target.display()))
        })?;
        written += chunk.len() as u64;
        bar.inc(chunk.len() as u64);
    }

    writer.flush().await.map_err(|e| {
        FetchFailure::Permanent(format!("failed to flush {}: {e}", target.display()))
    })?;
    writer.get_ref().sync_all().await.map_err(|e| {
        FetchFailure::Permanent(format!("failed to sync {}: {e}", target.display()))
    })?;

    Ok(written)
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn classify_reqwest(error: reqwest::Error) -> FetchFailure {
    let transient = error.is_timeout() || error.is_connect() || error.is_body();
    let reason = describe_reqwest(error);
    if transient {
        FetchFailure::Transient(reason)
    } else {
        FetchFailure::Permanent(reason)
    }
}

/// Render a reqwest error and its causes, without the request URL.
fn describe_reqwest(error: reqwest::Error) -> String {
    let timed_out = error.is_timeout();
    let error = error.without_url();

    let mut message = error.to_string();
    let mut source = std::error::Error::source(&error);
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }

    if timed_out && !message.contains("timed out") {
        message.push_str(" (timed out)");
    }
    message
}

/// First non-empty line of an error body, capped in length.
fn error_body_excerpt(body: &str) -> String {
    let line = body.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    line.chars().take(MAX_ERROR_BODY_EXCERPT).collect()
}
