//! Core data models.
//!
//! These types flow between the router, orchestrator, resolver, cache and batch
//! queue. Wire-facing types serialize as camelCase.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ProviderFailure, TrackError};

// =============================================================================
// Tracking Type
// =============================================================================

/// Kind of identifier being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackingType {
    /// ISO 6346 container number.
    Container,
    /// Bill of lading number.
    BillOfLading,
    /// Carrier booking reference.
    Booking,
}

impl TrackingType {
    /// All tracking types.
    pub const ALL: &'static [Self] = &[Self::Container, Self::BillOfLading, Self::Booking];

    /// Stable label used in URLs, config and cache keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::BillOfLading => "bill-of-lading",
            Self::Booking => "booking",
        }
    }
}

impl fmt::Display for TrackingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingType {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "container" | "cntr" => Ok(Self::Container),
            "bill-of-lading" | "bol" | "bl" | "mbl" => Ok(Self::BillOfLading),
            "booking" | "bkg" => Ok(Self::Booking),
            _ => Err(TrackError::InvalidTrackingType(s.to_string())),
        }
    }
}

// =============================================================================
// Priority
// =============================================================================

/// Request priority lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" | "urgent" => Ok(Self::High),
            "medium" | "normal" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(TrackError::InvalidPriority(s.to_string())),
        }
    }
}

// =============================================================================
// Tracking Request
// =============================================================================

/// A single tracking query. Created per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRequest {
    pub tracking_number: String,
    pub tracking_type: TrackingType,
    pub priority: Priority,

    /// Free-form caller context (request id, user, etc.) for log correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester: Option<String>,
}

impl TrackingRequest {
    /// Create a request, normalizing the tracking number to trimmed uppercase.
    #[must_use]
    pub fn new(tracking_number: &str, tracking_type: TrackingType, priority: Priority) -> Self {
        Self {
            tracking_number: normalize_tracking_number(tracking_number),
            tracking_type,
            priority,
            requester: None,
        }
    }

    /// Attach requester context.
    #[must_use]
    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }
}

/// Normalize a tracking number: strip whitespace and dashes, uppercase.
#[must_use]
pub fn normalize_tracking_number(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

// =============================================================================
// Provider Tier
// =============================================================================

/// Pricing category of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTier {
    Free,
    Freemium,
    Paid,
    Premium,
}

impl ProviderTier {
    /// Stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Freemium => "freemium",
            Self::Paid => "paid",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Shipment Data
// =============================================================================

/// One milestone in a shipment's journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentEvent {
    pub timestamp: DateTime<Utc>,
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A container on the shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub number: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seal: Option<String>,
}

/// Vessel currently carrying the shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vessel {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imo: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voyage: Option<String>,
}

/// Port-to-port route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub origin: String,
    pub destination: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<DateTime<Utc>>,
}

/// The shipment body an adapter extracts from its provider.
///
/// Every field is optional: providers routinely omit data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default)]
    pub timeline: Vec<ShipmentEvent>,

    #[serde(default)]
    pub containers: Vec<Container>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vessel: Option<Vessel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,

    /// When the provider last saw a change on this shipment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

// =============================================================================
// Raw Result
// =============================================================================

/// Outcome status of a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Structured failure reported by an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,

    /// Provider-supplied hint for when to try again.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "duration_ms_opt")]
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// One provider's unprocessed answer to a tracking query. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResult {
    pub provider_id: String,
    pub tracking_number: String,
    pub payload: Option<ShipmentPayload>,
    pub reliability: f64,
    pub fetched_at: DateTime<Utc>,
    pub status: ResultStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderError>,
}

impl RawResult {
    /// A successful answer.
    #[must_use]
    pub fn success(
        provider_id: impl Into<String>,
        tracking_number: impl Into<String>,
        payload: ShipmentPayload,
        reliability: f64,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            tracking_number: tracking_number.into(),
            payload: Some(payload),
            reliability,
            fetched_at: Utc::now(),
            status: ResultStatus::Success,
            error: None,
        }
    }

    /// A failed answer.
    #[must_use]
    pub fn failure(
        provider_id: impl Into<String>,
        tracking_number: impl Into<String>,
        error: ProviderError,
        reliability: f64,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            tracking_number: tracking_number.into(),
            payload: None,
            reliability,
            fetched_at: Utc::now(),
            status: ResultStatus::Error,
            error: Some(error),
        }
    }

    /// Override the fetch timestamp.
    #[must_use]
    pub const fn fetched_at(mut self, at: DateTime<Utc>) -> Self {
        self.fetched_at = at;
        self
    }

    /// Whether this result carries usable data.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success && self.payload.is_some()
    }

    /// Failure kind, if this is an error result.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Diagnostic record for aggregated errors.
    #[must_use]
    pub fn to_failure(&self) -> ProviderFailure {
        let (kind, message) = self.error.as_ref().map_or_else(
            || (ErrorKind::InvalidResponse, "empty payload".to_string()),
            |e| (e.kind, e.message.clone()),
        );
        ProviderFailure {
            provider_id: self.provider_id.clone(),
            kind,
            message,
        }
    }
}

// =============================================================================
// Canonical Shipment
// =============================================================================

/// The single reconciled tracking record returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalShipment {
    pub tracking_number: String,
    pub tracking_type: TrackingType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default)]
    pub timeline: Vec<ShipmentEvent>,

    #[serde(default)]
    pub containers: Vec<Container>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vessel: Option<Vessel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,

    pub last_updated: DateTime<Utc>,

    /// Provider id of the primary result.
    pub data_source: String,

    /// Reliability of the primary result.
    pub reliability: f64,

    /// Set when this record is a last-resort stale cache read.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
}

impl CanonicalShipment {
    /// The shipment body, without provenance.
    #[must_use]
    pub fn payload(&self) -> ShipmentPayload {
        ShipmentPayload {
            carrier: self.carrier.clone(),
            service: self.service.clone(),
            status: self.status.clone(),
            timeline: self.timeline.clone(),
            containers: self.containers.clone(),
            vessel: self.vessel.clone(),
            route: self.route.clone(),
            last_updated: Some(self.last_updated),
        }
    }
}

/// Serde helper for `Option<Duration>` as integer milliseconds.
mod duration_ms_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_type_parses_aliases() {
        assert_eq!("BL".parse::<TrackingType>().unwrap(), TrackingType::BillOfLading);
        assert_eq!("container".parse::<TrackingType>().unwrap(), TrackingType::Container);
        assert!("pallet".parse::<TrackingType>().is_err());
    }

    #[test]
    fn priority_parses_and_defaults() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(Priority::default(), Priority::Medium);
        assert!("asap".parse::<Priority>().is_err());
    }

    #[test]
    fn request_normalizes_number() {
        let req = TrackingRequest::new(" maeu-123 4567 ", TrackingType::Container, Priority::Low);
        assert_eq!(req.tracking_number, "MAEU1234567");
    }

    #[test]
    fn failure_result_converts_to_diagnostic() {
        let result = RawResult::failure(
            "alpha",
            "MAEU1234567",
            ProviderError::new(ErrorKind::RateLimit, "slow down")
                .with_retry_after(Duration::from_secs(3)),
            0.9,
        );
        assert!(!result.is_success());
        assert_eq!(result.error_kind(), Some(ErrorKind::RateLimit));
        let failure = result.to_failure();
        assert_eq!(failure.provider_id, "alpha");
        assert_eq!(failure.kind, ErrorKind::RateLimit);
    }

    #[test]
    fn raw_result_json_shape() {
        let result = RawResult::failure(
            "alpha",
            "MAEU1234567",
            ProviderError::new(ErrorKind::RateLimit, "slow down")
                .with_retry_after(Duration::from_millis(1500)),
            0.9,
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["providerId"], "alpha");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["kind"], "RATE_LIMIT");
        assert_eq!(json["error"]["retryAfter"], 1500);
    }
}
