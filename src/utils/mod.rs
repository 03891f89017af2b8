//! Utility module for the payments synchronizer.
//!
//! Re-exports display formatting helpers used by the record mapper and the CLI.

/// Utility functions for formatting and display
pub mod format;

pub use format::{format_timestamp, format_timestamp_in, group_digits};
