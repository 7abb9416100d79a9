//! Integration test suite for geoip-refresh
//!
//! Runs the refresh pipeline end to end against a local HTTP server and
//! drives the binary with `assert_cmd`.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! - **pipeline**: library-level runs (isolation, cleanup, retries, ordering)
//! - **cli**: `update`, `list` and `config` commands

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod pipeline;
