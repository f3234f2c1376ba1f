//! Provider adapter contract.
//!
//! Every tracking provider is reached through one `ProviderAdapter`. Adapters own
//! their wire protocol, parsing, and classification of failures into
//! [`ErrorKind`](crate::error::ErrorKind); the engine never branches on which
//! carrier an adapter talks to.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::models::{ProviderTier, RawResult, TrackingType};

/// Self-description an adapter reports at startup to seed the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterConfig {
    pub reliability: f64,
    pub supported_types: Vec<TrackingType>,
    pub tier: ProviderTier,
    pub rate_limit_capacity: u32,
    #[serde(default)]
    pub cost_per_request: f64,
    #[serde(default)]
    pub carriers: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
}

/// Uniform contract for a tracking provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider id used in the catalog, logs, and `RawResult`s.
    fn id(&self) -> &str;

    /// Query the provider.
    ///
    /// Failures are returned as `RawResult`s with `status = error`, never as panics.
    /// Implementations should stop work promptly once `cancel` fires.
    async fn fetch(
        &self,
        tracking_number: &str,
        tracking_type: TrackingType,
        cancel: CancellationToken,
    ) -> RawResult;

    /// Whether credentials are present.
    fn is_available(&self) -> bool;

    /// Static metadata used to seed the provider catalog.
    fn config(&self) -> AdapterConfig;

    /// Lightweight liveness check used to revive providers marked down.
    async fn health_check(&self) -> bool {
        self.is_available()
    }
}

/// Shared handle to an adapter.
pub type SharedAdapter = Arc<dyn ProviderAdapter>;

/// Registry of adapters keyed by provider id, in registration order.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    order: Vec<String>,
    adapters: HashMap<String, SharedAdapter>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. A later registration with the same id replaces the earlier one.
    pub fn register(&mut self, adapter: SharedAdapter) {
        let id = adapter.id().to_string();
        if self.adapters.insert(id.clone(), adapter).is_none() {
            self.order.push(id);
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<SharedAdapter> {
        self.adapters.get(id).cloned()
    }

    /// Adapters in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &SharedAdapter> {
        self.order.iter().filter_map(|id| self.adapters.get(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.order)
            .finish()
    }
}
