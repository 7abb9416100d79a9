//! The database refresh pipeline.
//!
//! For each configured database the pipeline downloads the publisher's
//! compressed archive, removes the gzip layer, unpacks the tar, locates the
//! payload inside the dated extraction directory and atomically replaces the
//! destination file. Temporary artifacts are tracked from creation and swept
//! when the job ends, successful or not.
//!
//! # Modules
//!
//! - [`job`] - requests, validated jobs and derived paths
//! - [`fetch`] - streaming download with retry
//! - [`unpack`] - decompression, extraction and payload discovery
//! - [`install`] - atomic replacement of the destination
//! - [`cleanup`] - temporary artifact tracking
//! - [`orchestrator`] - per-job sequencing, isolation and concurrency
//! - [`report`] - outcomes and the aggregate report
//! - [`error`] - stage-classified job errors
//!
//! # Example
//!
//! ```rust,no_run
//! use geoip_refresh::refresh::{JobRequest, RefreshSettings, Refresher};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let refresher = Refresher::new(RefreshSettings::default())?;
//! let report = refresher
//!     .run(vec![JobRequest::new(
//!         "GeoLite2-City",
//!         "/var/lib/geoip/GeoLite2-City.mmdb",
//!         "license-key",
//!     )])
//!     .await;
//! std::process::exit(report.exit_code());
//! # }
//! ```

pub mod cleanup;
pub mod error;
pub mod fetch;
pub mod install;
pub mod job;
pub mod orchestrator;
pub mod report;
pub mod unpack;

pub use cleanup::{CleanupReport, TemporaryArtifacts};
pub use error::{RefreshError, Stage};
pub use fetch::ArchiveFetcher;
pub use install::install;
pub use job::{
    DEFAULT_ARCHIVE_SUFFIX, DEFAULT_DOWNLOAD_URL, DEFAULT_PAYLOAD_EXTENSION, DatabaseJob,
    JobRequest, JobState,
};
pub use orchestrator::{RefreshSettings, Refresher};
pub use report::{InstalledPayload, JobOutcome, RunReport};
pub use unpack::{UnpackedPayload, unpack};
