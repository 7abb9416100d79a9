//! Global constants used throughout the crate.
//!
//! Timeouts, retry parameters and buffer sizes live here so the numbers are
//! discoverable in one place.

use std::time::Duration;

/// User agent sent with every download request.
pub const USER_AGENT: &str = concat!("geoip-refresh/", env!("CARGO_PKG_VERSION"));

/// Default whole-transfer timeout for one download attempt.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of retries for transient download failures.
pub const DEFAULT_FETCH_RETRIES: usize = 2;

/// Backoff delays are `FETCH_BACKOFF_BASE_MS^n * FETCH_BACKOFF_FACTOR` ms: 500ms, 1s, 2s...
pub const FETCH_BACKOFF_BASE_MS: u64 = 2;

pub const FETCH_BACKOFF_FACTOR: u64 = 250;

pub const MAX_FETCH_BACKOFF: Duration = Duration::from_secs(10);

/// Write buffer for streaming the response body to disk.
pub const FETCH_BUFFER_CAPACITY: usize = 64 * 1024;

/// Read/write buffer for decompression and extraction.
pub const UNPACK_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Copy buffer for installing the payload.
pub const COPY_BUFFER_CAPACITY: usize = 256 * 1024;

/// Characters of a publisher error body kept in a fetch error.
pub const MAX_ERROR_BODY_EXCERPT: usize = 200;

/// Default number of databases refreshed concurrently.
pub const DEFAULT_MAX_PARALLEL: usize = 1;
