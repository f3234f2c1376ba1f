//! Conflict resolution.
//!
//! Merges successful provider answers into one canonical shipment. The most
//! reliable answer is the primary and wins every disagreement; weaker answers only
//! fill gaps and contribute timeline events the primary lacks.

use std::cmp::Ordering;

use super::models::{CanonicalShipment, RawResult, ShipmentEvent, ShipmentPayload, TrackingType};
use crate::error::{Result, TrackError};

/// Events closer than this (in milliseconds) are candidates for de-duplication.
pub const DUPLICATE_WINDOW_MS: i64 = 60_000;

/// Merge provider results into one canonical record.
///
/// Error results are ignored. Input order does not affect the output.
///
/// # Errors
/// Returns `NoData` when no result is successful.
pub fn resolve(tracking_type: TrackingType, results: &[RawResult]) -> Result<CanonicalShipment> {
    let mut ranked: Vec<(&RawResult, &ShipmentPayload)> = results
        .iter()
        .filter(|r| r.is_success())
        .filter_map(|r| r.payload.as_ref().map(|p| (r, p)))
        .collect();

    ranked.sort_by(|(a, _), (b, _)| {
        b.reliability
            .partial_cmp(&a.reliability)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.provider_id.cmp(&b.provider_id))
    });

    let Some(&(primary, primary_payload)) = ranked.first() else {
        return Err(TrackError::NoData);
    };
    let others = &ranked[1..];

    let timeline = if others.is_empty() {
        primary_payload.timeline.clone()
    } else {
        merge_timelines(&ranked)
    };

    // Back-fill from the next most reliable result that has the field.
    let fill = |pick: fn(&ShipmentPayload) -> bool| {
        others.iter().map(|(_, p)| *p).find(|p| pick(p))
    };

    let carrier = primary_payload
        .carrier
        .clone()
        .or_else(|| fill(|p| p.carrier.is_some()).and_then(|p| p.carrier.clone()));
    let service = primary_payload
        .service
        .clone()
        .or_else(|| fill(|p| p.service.is_some()).and_then(|p| p.service.clone()));
    let status = primary_payload
        .status
        .clone()
        .or_else(|| fill(|p| p.status.is_some()).and_then(|p| p.status.clone()));
    let vessel = primary_payload
        .vessel
        .clone()
        .or_else(|| fill(|p| p.vessel.is_some()).and_then(|p| p.vessel.clone()));
    let route = primary_payload
        .route
        .clone()
        .or_else(|| fill(|p| p.route.is_some()).and_then(|p| p.route.clone()));
    let containers = if primary_payload.containers.is_empty() {
        fill(|p| !p.containers.is_empty())
            .map(|p| p.containers.clone())
            .unwrap_or_default()
    } else {
        primary_payload.containers.clone()
    };
    let last_updated = primary_payload
        .last_updated
        .or_else(|| fill(|p| p.last_updated.is_some()).and_then(|p| p.last_updated))
        .unwrap_or(primary.fetched_at);

    if !others.is_empty() {
        tracing::debug!(
            tracking_number = %primary.tracking_number,
            primary = %primary.provider_id,
            sources = ranked.len(),
            events = timeline.len(),
            "Resolved conflicting results"
        );
    }

    Ok(CanonicalShipment {
        tracking_number: primary.tracking_number.clone(),
        tracking_type,
        carrier,
        service,
        status,
        timeline,
        containers,
        vessel,
        route,
        last_updated,
        data_source: primary.provider_id.clone(),
        reliability: primary.reliability,
        stale: false,
    })
}

/// Union of all timelines, dropping cross-source duplicates.
///
/// `ranked` is ordered most reliable first, so the first copy kept of a duplicate is
/// the most reliable one.
fn merge_timelines(ranked: &[(&RawResult, &ShipmentPayload)]) -> Vec<ShipmentEvent> {
    let mut merged: Vec<(&str, &ShipmentEvent)> = Vec::new();

    for (result, payload) in ranked {
        for event in &payload.timeline {
            let duplicate = merged.iter().any(|(source, kept)| {
                *source != result.provider_id && is_duplicate(kept, event)
            });
            if !duplicate {
                merged.push((result.provider_id.as_str(), event));
            }
        }
    }

    let mut timeline: Vec<ShipmentEvent> = merged.into_iter().map(|(_, e)| e.clone()).collect();
    timeline.sort_by_key(|e| e.timestamp);
    timeline
}

fn is_duplicate(a: &ShipmentEvent, b: &ShipmentEvent) -> bool {
    (a.timestamp - b.timestamp).num_milliseconds().abs() < DUPLICATE_WINDOW_MS
        && a.status.trim().eq_ignore_ascii_case(b.status.trim())
        && normalize_location(a.location.as_deref()) == normalize_location(b.location.as_deref())
}

/// Lowercase, drop punctuation, collapse whitespace.
fn normalize_location(location: Option<&str>) -> String {
    location
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
