//! geoip-refresh - keep local GeoIP databases current
//!
//! Downloads third-party GeoIP database editions as compressed archives,
//! unpacks them and atomically replaces the installed files that a lookup
//! service reads. Each edition is refreshed independently: a failure on one
//! never corrupts its installed file and never stops the others, and no
//! temporary artifact outlives its job.
//!
//! # Modules
//!
//! - [`refresh`] - the pipeline: fetch, unpack, install, cleanup, orchestration
//! - [`config`] - the TOML configuration file
//! - [`cli`] - the `geoip-refresh` command
//! - [`core`] - command-level errors and user-facing error rendering
//! - [`utils`] - atomic file writes and progress bars
//! - [`constants`] - timeouts, retry and buffer sizes
//!
//! # Library use
//!
//! ```rust,no_run
//! use geoip_refresh::config::RefreshConfig;
//! use geoip_refresh::refresh::Refresher;
//! use geoip_refresh::utils::MultiProgress;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RefreshConfig::load_or_default(&RefreshConfig::default_path()?).await?;
//! let requests = config.to_requests(None, &[])?;
//! let refresher = Refresher::new(config.refresh_settings(None, None, MultiProgress::hidden()))?;
//!
//! let report = refresher.run(requests).await;
//! for outcome in &report.outcomes {
//!     println!("{}: {}", outcome.identifier, outcome.succeeded);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod refresh;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
