//! `track` command.

use futures::future::join_all;

use super::args::{OutputFormat, TrackArgs};
use super::open_engine;
use crate::error::{ExitCode, Result, TrackError};
use crate::render;
use crate::storage::config::Config;

/// Track every requested number, print the results, and report the exit code.
///
/// Per-number failures are rendered alongside successes; the exit code is the
/// first failure's.
///
/// # Errors
/// Returns an error if the engine cannot be built or started, or rendering fails.
pub async fn execute(
    args: &TrackArgs,
    config: Config,
    format: OutputFormat,
    pretty: bool,
) -> Result<ExitCode> {
    let engine = open_engine(config, true)?;
    engine.start().await?;

    let priority = args.effective_priority();
    let outcomes = join_all(args.numbers.iter().map(|number| {
        let engine = &engine;
        async move {
            let outcome = if args.refresh {
                engine.refresh(number, args.tracking_type).await
            } else {
                engine
                    .track_shipment(number, args.tracking_type, priority)
                    .await
            };
            (number.clone(), outcome)
        }
    }))
    .await;

    let metrics = args.stats.then(|| engine.optimization_metrics());
    if let Err(e) = engine.stop().await {
        tracing::warn!(error = %e, "Engine did not stop cleanly");
    }

    println!(
        "{}",
        render::render_track(&outcomes, metrics.as_ref(), format, pretty)?.trim_end()
    );

    Ok(outcomes
        .iter()
        .find_map(|(_, outcome)| outcome.as_ref().err())
        .map_or(ExitCode::Success, TrackError::exit_code))
}
