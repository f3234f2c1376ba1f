//! shiptrack - multi-source ocean freight tracking.
//!
//! Routes each tracking request to the best providers, fans out with retry and
//! timeouts, reconciles disagreeing answers into one canonical shipment, and
//! caches the result with an adaptive TTL. Requests are buffered in priority
//! lanes and dispatched in provider-grouped batches.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod providers;
pub mod render;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::core::engine::{Engine, EngineBuilder, ProviderStats};
pub use error::{ErrorKind, ExitCode, Result, TrackError};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
