//! Provider descriptors and catalog.
//!
//! The catalog is static metadata, seeded once at startup from each adapter's
//! self-description and the `[[providers]]` overrides in the config file.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::adapter::AdapterConfig;
use super::models::{ProviderTier, TrackingType};
use crate::storage::config::ProviderSettings;

/// Default refill window for a provider's token bucket.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

// =============================================================================
// Provider Descriptor
// =============================================================================

/// Static metadata for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub id: String,
    pub tier: ProviderTier,
    /// Static trust score in [0, 1].
    pub base_reliability: f64,
    pub cost_per_request: f64,
    /// Token bucket size.
    pub rate_limit_capacity: u32,
    /// Time for an empty bucket to refill completely.
    #[serde(with = "duration_ms")]
    pub rate_limit_window: Duration,
    pub supported_types: Vec<TrackingType>,
    pub regions: Vec<String>,
    /// Carrier codes this provider specializes in (see the format detector).
    pub carriers: Vec<String>,
    /// Whether the adapter had credentials when the catalog was built.
    pub available: bool,
    /// Per-provider daily spend ceiling, overriding the router default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_cost_ceiling: Option<f64>,
}

impl ProviderDescriptor {
    /// Build a descriptor from an adapter's self-description, applying overrides.
    #[must_use]
    pub fn from_adapter(
        id: &str,
        config: &AdapterConfig,
        available: bool,
        overrides: Option<&ProviderSettings>,
    ) -> Self {
        let mut descriptor = Self {
            id: id.to_string(),
            tier: config.tier,
            base_reliability: config.reliability.clamp(0.0, 1.0),
            cost_per_request: config.cost_per_request.max(0.0),
            rate_limit_capacity: config.rate_limit_capacity.max(1),
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
            supported_types: config.supported_types.clone(),
            regions: config.regions.clone(),
            carriers: config.carriers.clone(),
            available,
            daily_cost_ceiling: None,
        };

        if let Some(settings) = overrides {
            descriptor.apply(settings);
        }

        descriptor
    }

    fn apply(&mut self, settings: &ProviderSettings) {
        if let Some(tier) = settings.tier {
            self.tier = tier;
        }
        if let Some(reliability) = settings.reliability {
            self.base_reliability = reliability.clamp(0.0, 1.0);
        }
        if let Some(cost) = settings.cost_per_request {
            self.cost_per_request = cost.max(0.0);
        }
        if let Some(capacity) = settings.rate_limit_capacity {
            self.rate_limit_capacity = capacity.max(1);
        }
        if let Some(window_ms) = settings.rate_limit_window_ms {
            self.rate_limit_window = Duration::from_millis(window_ms.max(1));
        }
        if !settings.supported_types.is_empty() {
            self.supported_types.clone_from(&settings.supported_types);
        }
        if !settings.regions.is_empty() {
            self.regions.clone_from(&settings.regions);
        }
        if !settings.carriers.is_empty() {
            self.carriers.clone_from(&settings.carriers);
        }
        self.daily_cost_ceiling = settings.daily_cost_ceiling;
    }

    /// Whether this provider can answer the given tracking type.
    #[must_use]
    pub fn supports(&self, tracking_type: TrackingType) -> bool {
        self.supported_types.contains(&tracking_type)
    }

    /// Whether this provider specializes in the given carrier.
    #[must_use]
    pub fn covers_carrier(&self, carrier: &str) -> bool {
        self.carriers.iter().any(|c| c.eq_ignore_ascii_case(carrier))
    }
}

// =============================================================================
// Provider Catalog
// =============================================================================

/// Insertion-ordered registry of provider descriptors.
///
/// Insertion order is the router's deterministic tie-breaker.
#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    descriptors: Vec<ProviderDescriptor>,
    index: HashMap<String, usize>,
}

impl ProviderCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a descriptor. Replacing keeps the original position.
    pub fn insert(&mut self, descriptor: ProviderDescriptor) {
        if let Some(&pos) = self.index.get(&descriptor.id) {
            self.descriptors[pos] = descriptor;
        } else {
            self.index
                .insert(descriptor.id.clone(), self.descriptors.len());
            self.descriptors.push(descriptor);
        }
    }

    /// Get a descriptor by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.index.get(id).map(|&pos| &self.descriptors[pos])
    }

    /// Position of a provider in insertion order.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Iterate descriptors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.descriptors.iter()
    }

    /// Number of providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Mean cost per request across the catalog.
    #[must_use]
    pub fn mean_cost(&self) -> f64 {
        if self.descriptors.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.descriptors.len() as f64;
        self.descriptors.iter().map(|d| d.cost_per_request).sum::<f64>() / n
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter_config() -> AdapterConfig {
        AdapterConfig {
            reliability: 0.9,
            supported_types: vec![TrackingType::Container],
            tier: ProviderTier::Free,
            rate_limit_capacity: 10,
            cost_per_request: 0.0,
            carriers: vec!["maersk".to_string()],
            regions: vec![],
        }
    }

    #[test]
    fn overrides_replace_adapter_values() {
        let settings = ProviderSettings {
            id: "alpha".to_string(),
            tier: Some(ProviderTier::Premium),
            cost_per_request: Some(0.25),
            rate_limit_capacity: Some(3),
            ..ProviderSettings::default()
        };
        let d = ProviderDescriptor::from_adapter("alpha", &adapter_config(), true, Some(&settings));
        assert_eq!(d.tier, ProviderTier::Premium);
        assert!((d.cost_per_request - 0.25).abs() < f64::EPSILON);
        assert_eq!(d.rate_limit_capacity, 3);
        assert!((d.base_reliability - 0.9).abs() < f64::EPSILON);
        assert!(d.covers_carrier("MAERSK"));
    }

    #[test]
    fn catalog_keeps_insertion_order() {
        let mut catalog = ProviderCatalog::new();
        for id in ["c", "a", "b"] {
            catalog.insert(ProviderDescriptor::from_adapter(id, &adapter_config(), true, None));
        }
        let ids: Vec<_> = catalog.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(catalog.position("b"), Some(2));

        // Replacing keeps position
        catalog.insert(ProviderDescriptor::from_adapter("a", &adapter_config(), false, None));
        assert_eq!(catalog.position("a"), Some(1));
        assert!(!catalog.get("a").unwrap().available);
        assert_eq!(catalog.len(), 3);
    }
}
