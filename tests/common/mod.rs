//! Shared helpers for integration tests.
//!
//! - `fixtures`: payload documents, config files, and engine builders
//! - `logger`: per-test structured progress logging
//! - `log_capture`: tracing capture for log assertions

pub mod fixtures;
pub mod log_capture;
pub mod logger;
