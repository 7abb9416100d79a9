//! Filesystem helpers and terminal progress indicators.
//!
//! - [`fs`] - directory creation and atomic file replacement
//! - [`progress`] - download progress bars

pub mod fs;
pub mod progress;

pub use fs::{atomic_copy, atomic_write, ensure_dir};
pub use progress::{MultiProgress, ProgressBar};
