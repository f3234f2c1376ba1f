//! Robot-mode output (JSON).
//!
//! Every command wraps its data in one stable envelope.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::engine::ProviderStats;
use crate::core::metrics::OptimizationMetrics;
use crate::core::models::CanonicalShipment;
use crate::error::{ProviderFailure, Result, TrackError};

/// Schema identifier carried by every envelope.
pub const SCHEMA_VERSION: &str = "shiptrack.v1";

/// Top-level JSON envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotOutput<T> {
    pub schema_version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub data: T,
    pub errors: Vec<ErrorReport>,
}

impl<T> RobotOutput<T> {
    pub fn new(command: impl Into<String>, data: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            command: command.into(),
            data,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_errors(mut self, errors: Vec<ErrorReport>) -> Self {
        self.errors = errors;
        self
    }
}

/// Structured error entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    pub code: &'static str,
    pub category: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ProviderFailure>,
}

impl ErrorReport {
    #[must_use]
    pub fn from_error(error: &TrackError, tracking_number: Option<&str>) -> Self {
        Self {
            tracking_number: tracking_number.map(ToString::to_string),
            code: error.error_code(),
            category: error.category().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
            failures: error.provider_failures().to_vec(),
        }
    }
}

/// Data section of `track` output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackData<'a> {
    pub shipments: Vec<&'a CanonicalShipment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<&'a OptimizationMetrics>,
}

/// Serialize, honoring `--pretty`.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

/// Render `track` results.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn render_track(
    outcomes: &[(String, Result<CanonicalShipment>)],
    metrics: Option<&OptimizationMetrics>,
    pretty: bool,
) -> Result<String> {
    let shipments = outcomes.iter().filter_map(|(_, r)| r.as_ref().ok()).collect();
    let errors = outcomes
        .iter()
        .filter_map(|(number, r)| {
            r.as_ref()
                .err()
                .map(|e| ErrorReport::from_error(e, Some(number)))
        })
        .collect();
    let output = RobotOutput::new("track", TrackData { shipments, metrics }).with_errors(errors);
    to_json(&output, pretty)
}

/// Render the provider table.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn render_providers(stats: &[ProviderStats], pretty: bool) -> Result<String> {
    to_json(&RobotOutput::new("providers", stats), pretty)
}

/// Render a single error as an envelope with no data.
#[must_use]
pub fn render_error(command: &str, error: &TrackError, pretty: bool) -> String {
    let output = RobotOutput::new(command, serde_json::Value::Null)
        .with_errors(vec![ErrorReport::from_error(error, None)]);
    to_json(&output, pretty).unwrap_or_else(|_| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::TrackingType;
    use crate::core::resolver;
    use crate::error::ErrorKind;
    use crate::test_utils::{make_test_payload, make_test_result};

    #[test]
    fn track_envelope_carries_shipments_and_errors() {
        let shipment = resolver::resolve(
            TrackingType::Container,
            &[make_test_result("alpha", 0.9, make_test_payload("In Transit"))],
        )
        .unwrap();
        let failure = TrackError::AllProvidersFailed {
            tracking_number: "MSCU7654321".to_string(),
            failures: vec![ProviderFailure {
                provider_id: "beta".to_string(),
                kind: ErrorKind::AuthError,
                message: "HTTP 401".to_string(),
            }],
        };
        let outcomes = vec![
            ("MAEU1234567".to_string(), Ok(shipment)),
            ("MSCU7654321".to_string(), Err(failure)),
        ];

        let json: serde_json::Value =
            serde_json::from_str(&render_track(&outcomes, None, false).unwrap()).unwrap();
        assert_eq!(json["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(json["command"], "track");
        assert_eq!(json["data"]["shipments"][0]["dataSource"], "alpha");
        assert!(json["data"].get("metrics").is_none());
        assert_eq!(json["errors"][0]["trackingNumber"], "MSCU7654321");
        assert_eq!(json["errors"][0]["failures"][0]["kind"], "AUTH_ERROR");
    }

    #[test]
    fn error_envelope_has_null_data() {
        let json: serde_json::Value = serde_json::from_str(&render_error(
            "track",
            &TrackError::InvalidTrackingNumber("??".to_string()),
            true,
        ))
        .unwrap();
        assert!(json["data"].is_null());
        assert_eq!(json["errors"][0]["retryable"], false);
    }
}
