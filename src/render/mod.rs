//! Output rendering for human and robot modes.

pub mod human;
pub mod robot;

use chrono::Utc;

use crate::cli::args::OutputFormat;
use crate::core::engine::ProviderStats;
use crate::core::metrics::OptimizationMetrics;
use crate::core::models::CanonicalShipment;
use crate::error::{Result, TrackError};

/// Render `track` results.
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn render_track(
    outcomes: &[(String, Result<CanonicalShipment>)],
    metrics: Option<&OptimizationMetrics>,
    format: OutputFormat,
    pretty: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => human::render_track(outcomes, metrics, Utc::now()),
        OutputFormat::Json => robot::render_track(outcomes, metrics, pretty),
    }
}

/// Render the provider table.
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn render_providers(
    stats: &[ProviderStats],
    format: OutputFormat,
    pretty: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_providers(stats)),
        OutputFormat::Json => robot::render_providers(stats, pretty),
    }
}

/// Render a fatal error for stderr (human) or stdout (JSON).
#[must_use]
pub fn render_error(command: &str, error: &TrackError, format: OutputFormat, pretty: bool) -> String {
    match format {
        OutputFormat::Human => human::render_error(error),
        OutputFormat::Json => robot::render_error(command, error, pretty),
    }
}
