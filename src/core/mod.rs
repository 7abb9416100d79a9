//! Core types shared by the CLI and the refresh pipeline.
//!
//! Currently this is the command-level error layer; see [`error`].

pub mod error;

pub use error::{ErrorContext, GeoipError, stage_suggestion, user_friendly_error};
