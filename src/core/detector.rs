//! Carrier-format detection.
//!
//! Maps tracking-number shapes to likely carriers. The router uses the detected
//! carrier to favour providers that specialize in it; the engine uses the detected
//! shape to infer a tracking type when the caller omits one.

use std::sync::LazyLock;

use regex::Regex;

use super::models::{TrackingType, normalize_tracking_number};
use crate::error::{Result, TrackError};

/// ISO 6346 container owner prefixes (owner code + category `U`) by carrier.
const CONTAINER_PREFIXES: &[(&str, &str)] = &[
    ("MAEU", "maersk"),
    ("MSKU", "maersk"),
    ("MRKU", "maersk"),
    ("MSCU", "msc"),
    ("MEDU", "msc"),
    ("CMAU", "cma-cgm"),
    ("CGMU", "cma-cgm"),
    ("HLCU", "hapag-lloyd"),
    ("HLXU", "hapag-lloyd"),
    ("COSU", "cosco"),
    ("CBHU", "cosco"),
    ("EGLV", "evergreen"),
    ("EISU", "evergreen"),
    ("ONEY", "one"),
    ("ONEU", "one"),
    ("ZIMU", "zim"),
    ("YMLU", "yang-ming"),
];

/// Bill-of-lading / booking patterns by carrier.
const DOCUMENT_PATTERNS: &[(&str, &str, TrackingType)] = &[
    (r"^MAEU\d{9}$", "maersk", TrackingType::BillOfLading),
    (r"^\d{9}$", "maersk", TrackingType::Booking),
    (r"^MEDU[A-Z0-9]{6,10}$", "msc", TrackingType::BillOfLading),
    (r"^CMDU[A-Z0-9]{6,12}$", "cma-cgm", TrackingType::BillOfLading),
    (r"^HLCU[A-Z0-9]{8,12}$", "hapag-lloyd", TrackingType::BillOfLading),
    (r"^COSU\d{10}$", "cosco", TrackingType::BillOfLading),
    (r"^EGLV\d{12}$", "evergreen", TrackingType::BillOfLading),
    (r"^ONEY[A-Z0-9]{8,12}$", "one", TrackingType::BillOfLading),
    (r"^ZIMU[A-Z]{3}\d{6,9}$", "zim", TrackingType::BillOfLading),
];

static CONTAINER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}[UJZ]\d{7}$").unwrap());

static VALID_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z0-9]{6,20}$").unwrap());

static DOCUMENT_REGEXES: LazyLock<Vec<(Regex, &'static str, TrackingType)>> = LazyLock::new(|| {
    DOCUMENT_PATTERNS
        .iter()
        .map(|(pattern, carrier, tracking_type)| {
            (Regex::new(pattern).unwrap(), *carrier, *tracking_type)
        })
        .collect()
});

/// Result of matching a tracking number against the format table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub carrier: Option<String>,
    pub tracking_type: TrackingType,
}

/// Tracking-number format table.
#[derive(Debug, Clone, Copy, Default)]
pub struct CarrierDetector;

impl CarrierDetector {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validate and normalize a caller-supplied tracking number.
    ///
    /// # Errors
    /// Returns `InvalidTrackingNumber` for empty, too short/long, or non-alphanumeric input.
    pub fn validate(&self, raw: &str) -> Result<String> {
        let normalized = normalize_tracking_number(raw);
        if VALID_REGEX.is_match(&normalized) {
            Ok(normalized)
        } else {
            Err(TrackError::InvalidTrackingNumber(raw.to_string()))
        }
    }

    /// Match a (normalized) tracking number against the table.
    #[must_use]
    pub fn detect(&self, tracking_number: &str) -> Detection {
        let number = normalize_tracking_number(tracking_number);

        if CONTAINER_REGEX.is_match(&number) {
            let carrier = CONTAINER_PREFIXES
                .iter()
                .find(|(prefix, _)| number.starts_with(prefix))
                .map(|(_, carrier)| (*carrier).to_string());
            return Detection {
                carrier,
                tracking_type: TrackingType::Container,
            };
        }

        for (regex, carrier, tracking_type) in DOCUMENT_REGEXES.iter() {
            if regex.is_match(&number) {
                return Detection {
                    carrier: Some((*carrier).to_string()),
                    tracking_type: *tracking_type,
                };
            }
        }

        Detection {
            carrier: None,
            tracking_type: TrackingType::BillOfLading,
        }
    }

    /// Likely carrier for a tracking number, if any pattern matches.
    #[must_use]
    pub fn carrier_for(&self, tracking_number: &str) -> Option<String> {
        self.detect(tracking_number).carrier
    }

    /// Tracking type inferred from the number's shape.
    #[must_use]
    pub fn infer_type(&self, tracking_number: &str) -> TrackingType {
        self.detect(tracking_number).tracking_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_document_patterns_compile() {
        assert_eq!(DOCUMENT_REGEXES.len(), DOCUMENT_PATTERNS.len());
    }

    #[test]
    fn container_prefix_maps_to_carrier() {
        let detector = CarrierDetector::new();
        let detection = detector.detect("MAEU1234567");
        assert_eq!(detection.tracking_type, TrackingType::Container);
        assert_eq!(detection.carrier.as_deref(), Some("maersk"));

        assert_eq!(detector.carrier_for("mscu 765432-1").as_deref(), Some("msc"));
    }

    #[test]
    fn unknown_owner_is_still_a_container() {
        let detector = CarrierDetector::new();
        let detection = detector.detect("ABCU1234567");
        assert_eq!(detection.tracking_type, TrackingType::Container);
        assert!(detection.carrier.is_none());
    }

    #[test]
    fn bill_of_lading_patterns() {
        let detector = CarrierDetector::new();
        assert_eq!(
            detector.detect("MAEU123456789"),
            Detection {
                carrier: Some("maersk".to_string()),
                tracking_type: TrackingType::BillOfLading,
            }
        );
        assert_eq!(detector.carrier_for("COSU6123456789").as_deref(), Some("cosco"));
        assert_eq!(detector.infer_type("123456789"), TrackingType::Booking);
    }

    #[test]
    fn unmatched_defaults_to_bill_of_lading() {
        let detector = CarrierDetector::new();
        let detection = detector.detect("XYZ99887766");
        assert!(detection.carrier.is_none());
        assert_eq!(detection.tracking_type, TrackingType::BillOfLading);
    }

    #[test]
    fn validation() {
        let detector = CarrierDetector::new();
        assert_eq!(detector.validate(" maeu1234567 ").unwrap(), "MAEU1234567");
        assert!(detector.validate("").is_err());
        assert!(detector.validate("AB12").is_err());
        assert!(detector.validate("MAEU12345$7").is_err());
    }
}
