//! `providers` command.

use super::args::OutputFormat;
use super::open_engine;
use crate::error::Result;
use crate::render;
use crate::storage::config::Config;

/// Print the provider catalog with live state.
///
/// # Errors
/// Returns an error if the engine cannot be built or rendering fails.
pub fn execute(config: Config, format: OutputFormat, pretty: bool) -> Result<()> {
    let engine = open_engine(config, false)?;
    let stats = engine.provider_stats();
    println!(
        "{}",
        render::render_providers(&stats, format, pretty)?.trim_end()
    );
    Ok(())
}
