//! Storage for configuration, the shipment cache, and its snapshots.

pub mod cache;
pub mod config;
pub mod paths;
pub mod snapshot;

pub use cache::{CacheEntry, CacheKey, CacheStats, ShipmentCache};
pub use config::{Config, ENV_CONFIG};
pub use paths::AppPaths;
pub use snapshot::{CacheStore, SqliteCacheStore};
