//! Test utilities for geoip-refresh
//!
//! Helpers shared by unit and integration tests: one-time logging setup and
//! builders for publisher-style archives.
//!
//! # Example
//!
//! ```rust,no_run
//! use geoip_refresh::test_utils::ArchiveBuilder;
//!
//! let bytes = ArchiveBuilder::publisher_layout("GeoLite2-City", "20240102", b"db")
//!     .build_tar_gz();
//! assert!(!bytes.is_empty());
//! ```

use std::io::Write;
use std::sync::Once;

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` if given, otherwise
/// `RUST_LOG`; with neither, tests run without a subscriber.
///
/// ```bash
/// RUST_LOG=geoip_refresh=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

enum Entry {
    Dir(String),
    File(String, Vec<u8>),
    Symlink(String, String),
}

/// Builds tar (and tar.gz) archives in memory.
#[derive(Default)]
pub struct ArchiveBuilder {
    entries: Vec<Entry>,
}

impl ArchiveBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The layout the publisher ships:
    /// `<id>_<date>/` with license files and `<id>_<date>/<id>.mmdb`.
    #[must_use]
    pub fn publisher_layout(identifier: &str, date: &str, payload: &[u8]) -> Self {
        let dir = format!("{identifier}_{date}");
        Self::new()
            .dir(&dir)
            .file(&format!("{dir}/COPYRIGHT.txt"), b"Database and Contents Copyright (c)")
            .file(&format!("{dir}/LICENSE.txt"), b"Use of this database is subject to terms")
            .file(&format!("{dir}/{identifier}.mmdb"), payload)
    }

    #[must_use]
    pub fn dir(mut self, path: &str) -> Self {
        self.entries.push(Entry::Dir(path.trim_end_matches('/').to_string()));
        self
    }

    #[must_use]
    pub fn file(mut self, path: &str, content: &[u8]) -> Self {
        self.entries.push(Entry::File(path.to_string(), content.to_vec()));
        self
    }

    /// A symbolic link entry at `path` pointing to `target`.
    #[must_use]
    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.entries.push(Entry::Symlink(path.to_string(), target.to_string()));
        self
    }

    /// Uncompressed tar bytes.
    ///
    /// # Panics
    ///
    /// If an entry path is not representable in a tar header.
    #[must_use]
    pub fn build_tar(&self) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for entry in &self.entries {
            let mut header = tar::Header::new_gnu();
            match entry {
                Entry::Dir(path) => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_mode(0o755);
                    header.set_size(0);
                    header.set_cksum();
                    builder.append_data(&mut header, format!("{path}/"), std::io::empty()).unwrap();
                }
                Entry::File(path, content) => {
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_mode(0o644);
                    header.set_size(content.len() as u64);
                    header.set_cksum();
                    builder.append_data(&mut header, path, content.as_slice()).unwrap();
                }
                Entry::Symlink(path, target) => {
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_mode(0o777);
                    header.set_size(0);
                    builder.append_link(&mut header, path, target).unwrap();
                }
            }
        }
        builder.into_inner().unwrap()
    }

    /// Gzip-compressed tar bytes, as served by the publisher.
    #[must_use]
    pub fn build_tar_gz(&self) -> Vec<u8> {
        gzip(&self.build_tar())
    }
}

/// Gzip `data` in memory.
///
/// # Panics
///
/// Never in practice; writes go to a `Vec`.
#[must_use]
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
