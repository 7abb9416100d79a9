//! Download progress indicators
//!
//! Thin wrappers around `indicatif` with the crate's styling. Progress output is
//! disabled when:
//! - the caller asks for it (`--no-progress`, `--quiet`, JSON output),
//! - stderr is not a terminal,
//! - `GEOIP_REFRESH_NO_PROGRESS` is set.
//!
//! A disabled [`MultiProgress`] hands out hidden bars, so callers never branch
//! on whether progress is shown.
//!
//! # Examples
//!
//! ```rust,no_run
//! use geoip_refresh::utils::progress::MultiProgress;
//!
//! let multi = MultiProgress::new(true);
//! let bar = multi.add_download(Some(1024), "GeoLite2-City");
//! bar.inc(512);
//! bar.finish_and_clear();
//! ```

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::fmt;
use std::io::IsTerminal;

/// Checks the environment override and whether stderr is a terminal.
#[must_use]
pub fn is_progress_disabled() -> bool {
    std::env::var_os("GEOIP_REFRESH_NO_PROGRESS").is_some() || !std::io::stderr().is_terminal()
}

/// A progress bar that may be hidden. Cleared from the terminal when dropped.
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl fmt::Debug for ProgressBar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressBar").field("hidden", &self.inner.is_hidden()).finish()
    }
}

impl ProgressBar {
    /// A bar that never draws.
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    /// Advance by `delta` bytes.
    pub fn inc(&self, delta: u64) {
        self.inner.inc(delta);
    }

    /// Update the message shown after the bar, e.g. the retry attempt.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Remove the bar from the terminal.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

impl Drop for ProgressBar {
    fn drop(&mut self) {
        if !self.inner.is_finished() {
            self.inner.finish_and_clear();
        }
    }
}

/// Container coordinating concurrent download bars.
#[derive(Clone)]
pub struct MultiProgress {
    inner: Option<indicatif::MultiProgress>,
}

impl fmt::Debug for MultiProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiProgress").field("enabled", &self.is_enabled()).finish()
    }
}

impl MultiProgress {
    /// Create a container; `enabled` is combined with [`is_progress_disabled`].
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        let inner = (enabled && !is_progress_disabled()).then(indicatif::MultiProgress::new);
        Self {
            inner,
        }
    }

    /// A container whose bars are all hidden.
    #[must_use]
    pub const fn hidden() -> Self {
        Self {
            inner: None,
        }
    }

    /// Whether bars are drawn.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Add a byte-counting bar; a spinner-like bar when the size is unknown.
    #[must_use]
    pub fn add_download(&self, len: Option<u64>, prefix: &str) -> ProgressBar {
        let Some(multi) = &self.inner else {
            return ProgressBar::hidden();
        };

        let bar = match len {
            Some(len) => {
                let bar = IndicatifBar::new(len);
                bar.set_style(download_style());
                bar
            }
            None => {
                let bar = IndicatifBar::new_spinner();
                bar.set_style(unknown_length_style());
                bar
            }
        };
        bar.set_prefix(prefix.to_string());

        ProgressBar {
            inner: multi.add(bar),
        }
    }
}

fn download_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("━╸━")
}

fn unknown_length_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{prefix:.bold.cyan} {spinner:.cyan} {bytes} ({bytes_per_sec}) {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
}
