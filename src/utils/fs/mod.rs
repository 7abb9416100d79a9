//! File system utilities
//!
//! Directory creation and atomic file replacement. Every write that another
//! process may observe (installed databases, the configuration file) goes
//! through [`atomic_write`] or [`atomic_copy`].

pub mod atomic;
pub mod dirs;

pub use atomic::{CopySummary, ReplaceMode, atomic_copy, atomic_write};
pub use dirs::{ensure_dir, ensure_parent_dir};
