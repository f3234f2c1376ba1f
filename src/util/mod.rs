//! Utility functions.

pub mod env;
pub mod format;
pub mod time;

pub use format::{format_cost, format_ms, format_percent};
pub use time::{format_relative_to, format_timestamp};
