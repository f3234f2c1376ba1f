//! Human-readable terminal output.
//!
//! Color is applied with `colored`; `--no-color` and `NO_COLOR` are honoured by
//! the global override set in `main`.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};

use crate::core::engine::ProviderStats;
use crate::core::health::HealthStatus;
use crate::core::metrics::OptimizationMetrics;
use crate::core::models::CanonicalShipment;
use crate::error::{Result, TrackError};
use crate::util::{format_cost, format_ms, format_percent, format_relative_to, format_timestamp};

fn status_label(status: &str) -> ColoredString {
    let lower = status.to_lowercase();
    if lower == "delivered" {
        status.green().bold()
    } else if lower.contains("exception") || lower.contains("hold") || lower.contains("delay") {
        status.red().bold()
    } else if lower.contains("transit") {
        status.cyan().bold()
    } else {
        status.yellow().bold()
    }
}

fn health_label(status: HealthStatus) -> ColoredString {
    match status {
        HealthStatus::Healthy => status.as_str().green(),
        HealthStatus::Degraded => status.as_str().yellow(),
        HealthStatus::Down => status.as_str().red(),
        HealthStatus::Unknown => status.as_str().dimmed(),
    }
}

/// Render one shipment card.
#[must_use]
pub fn render_shipment(shipment: &CanonicalShipment, now: DateTime<Utc>) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} {} ({})",
        "●".bold(),
        shipment.tracking_number.bold(),
        shipment.tracking_type
    );
    let _ = writeln!(
        out,
        "  Status:   {}",
        status_label(shipment.status.as_deref().unwrap_or("Unknown"))
    );
    if let Some(carrier) = &shipment.carrier {
        match &shipment.service {
            Some(service) => {
                let _ = writeln!(out, "  Carrier:  {carrier} / {service}");
            }
            None => {
                let _ = writeln!(out, "  Carrier:  {carrier}");
            }
        }
    }
    if let Some(vessel) = &shipment.vessel {
        let voyage = vessel
            .voyage
            .as_deref()
            .map(|v| format!(" voy. {v}"))
            .unwrap_or_default();
        let _ = writeln!(out, "  Vessel:   {}{voyage}", vessel.name);
    }
    if let Some(route) = &shipment.route {
        let eta = route
            .eta
            .map(|eta| format!(" (ETA {})", format_timestamp(eta)))
            .unwrap_or_default();
        let _ = writeln!(out, "  Route:    {} → {}{eta}", route.origin, route.destination);
    }
    if !shipment.containers.is_empty() {
        let numbers: Vec<&str> = shipment.containers.iter().map(|c| c.number.as_str()).collect();
        let _ = writeln!(out, "  Boxes:    {}", numbers.join(", "));
    }

    let updated = format_relative_to(shipment.last_updated, now);
    let source = format!(
        "{} ({:.0}% reliable)",
        shipment.data_source,
        shipment.reliability * 100.0
    );
    if shipment.stale {
        let _ = writeln!(
            out,
            "  Source:   {source}, {}",
            format!("stale, last updated {updated}").yellow()
        );
    } else {
        let _ = writeln!(out, "  Source:   {source}, updated {updated}");
    }

    if !shipment.timeline.is_empty() {
        let _ = writeln!(out, "  Timeline:");
        for event in &shipment.timeline {
            let location = event
                .location
                .as_deref()
                .map(|l| format!(" · {l}"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "    {}  {}{}",
                format_timestamp(event.timestamp).dimmed(),
                event.status,
                location
            );
        }
    }

    out
}

/// Render every tracked number, errors inline.
///
/// # Errors
/// Never fails today; kept fallible to match the JSON renderer.
pub fn render_track(
    outcomes: &[(String, Result<CanonicalShipment>)],
    metrics: Option<&OptimizationMetrics>,
    now: DateTime<Utc>,
) -> Result<String> {
    let mut out = String::new();
    for (number, outcome) in outcomes {
        match outcome {
            Ok(shipment) => out.push_str(&render_shipment(shipment, now)),
            Err(e) => out.push_str(&render_inline_error(number, e)),
        }
        out.push('\n');
    }
    if let Some(metrics) = metrics {
        out.push_str(&render_metrics(metrics));
    }
    Ok(out)
}

fn render_inline_error(number: &str, error: &TrackError) -> String {
    let mut out = format!(
        "{} {} {}\n",
        "✗".red().bold(),
        number.bold(),
        error.error_code().dimmed()
    );
    let failures = error.provider_failures();
    if failures.is_empty() {
        let _ = writeln!(out, "  {error}");
    } else {
        let _ = writeln!(out, "  All providers failed:");
        for failure in failures {
            let _ = writeln!(
                out,
                "    {:<16} {:<16} {}",
                failure.provider_id,
                failure.kind.as_str().red(),
                failure.message
            );
        }
    }
    out
}

/// Render the optimization summary.
#[must_use]
pub fn render_metrics(metrics: &OptimizationMetrics) -> String {
    let mut out = format!("{}\n", "Engine".bold());
    let _ = writeln!(out, "  Cache hit rate:   {}", format_percent(metrics.cache_hit_rate));
    let _ = writeln!(out, "  Avg response:     {}", format_ms(metrics.avg_response_time_ms));
    let _ = writeln!(out, "  Batch efficiency: {:.1} req/group", metrics.batch_efficiency);
    let _ = writeln!(out, "  Cost savings:     {}", format_cost(metrics.cost_savings));
    let _ = writeln!(out, "  Provider calls:   {}", metrics.counters.provider_calls);
    out
}

/// Render the provider table.
#[must_use]
pub fn render_providers(stats: &[ProviderStats]) -> String {
    if stats.is_empty() {
        return format!(
            "{}\n  Add [[providers]] entries with a base_url to the config file.\n",
            "No providers configured.".yellow()
        );
    }

    let mut out = format!(
        "{:<18} {:<9} {:<9} {:>6} {:>9} {:>10} {:>9}\n",
        "PROVIDER".bold(),
        "TIER".bold(),
        "HEALTH".bold(),
        "REL".bold(),
        "TOKENS".bold(),
        "COST/REQ".bold(),
        "TODAY".bold()
    );
    for s in stats {
        let name = if s.available {
            s.id.normal()
        } else {
            format!("{} (no key)", s.id).dimmed()
        };
        let _ = writeln!(
            out,
            "{:<18} {:<9} {:<9} {:>6} {:>9} {:>10} {:>9}",
            name,
            s.tier.as_str(),
            health_label(s.status),
            format_percent(s.reliability),
            format!("{:.0}/{}", s.tokens_available.floor(), s.capacity),
            format_cost(s.cost_per_request),
            format_cost(s.daily_cost)
        );
    }
    out
}

/// Render a top-level error for stderr.
#[must_use]
pub fn render_error(error: &TrackError) -> String {
    let mut out = format!(
        "{} {} {}\n",
        "error:".red().bold(),
        error,
        format!("[{}]", error.error_code()).dimmed()
    );
    for failure in error.provider_failures() {
        let _ = writeln!(out, "  - {failure}");
    }
    out
}
