//! Configuration for geoip-refresh
//!
//! A single TOML file lists the databases to refresh, where each one is
//! installed, and the publisher credential.
//!
//! **Location** (first match wins):
//! 1. `--config <PATH>`
//! 2. `GEOIP_REFRESH_CONFIG`
//! 3. `<config_dir>/geoip-refresh/config.toml`
//!    (`~/.config` on Linux, `~/Library/Application Support` on macOS,
//!    `%APPDATA%` on Windows)
//!
//! A missing file is not an error: the three GeoLite2 editions are selected
//! with no destination paths, so each job reports what is missing.
//!
//! The file may hold a credential, so `config init` creates it with owner-only
//! permissions on Unix and `config show` redacts it.

pub mod global;

pub use global::{DEFAULT_EDITIONS, DatabaseEntry, RefreshConfig};
