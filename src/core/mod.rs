//! Tracking engine: routing, fan-out, reconciliation and batching.

pub mod adapter;
pub mod batch;
pub mod catalog;
pub mod cost_ledger;
pub mod detector;
pub mod engine;
pub mod health;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod rate_limiter;
pub mod resolver;
pub mod retry;
pub mod router;

pub use adapter::{AdapterConfig, AdapterRegistry, ProviderAdapter, SharedAdapter};
pub use batch::{BatchQueue, BatchStats, BatchTicket};
pub use catalog::{ProviderCatalog, ProviderDescriptor};
pub use detector::{CarrierDetector, Detection};
pub use engine::{Engine, EngineBuilder, ProviderStats};
pub use health::{HealthMonitor, HealthStatus, ProviderHealth};
pub use metrics::{EngineMetrics, OptimizationMetrics};
pub use models::{
    CanonicalShipment, Priority, ProviderError, ProviderTier, RawResult, ShipmentEvent,
    ShipmentPayload, TrackingRequest, TrackingType,
};
pub use orchestrator::{FetchReport, Orchestrator};
pub use router::{RankedProvider, SmartRouter};
