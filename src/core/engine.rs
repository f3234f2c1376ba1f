//! Engine context.
//!
//! Owns every shared component and the background tasks (cache sweep, provider
//! health checks). Built once from a [`Config`] plus the registered adapters; there are no
//! global singletons.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;

use super::adapter::{AdapterRegistry, SharedAdapter};
use super::batch::{BatchQueue, BatchStats};
use super::catalog::{ProviderCatalog, ProviderDescriptor};
use super::cost_ledger::CostLedger;
use super::detector::CarrierDetector;
use super::health::{HealthMonitor, HealthStatus};
use super::metrics::{EngineMetrics, OptimizationMetrics};
use super::models::{
    CanonicalShipment, Priority, ProviderTier, RawResult, TrackingRequest, TrackingType,
};
use super::orchestrator::{Orchestrator, OrchestratorParts};
use super::rate_limiter::RateLimiter;
use super::resolver;
use super::router::SmartRouter;
use crate::error::{Result, TrackError};
use crate::storage::cache::{CacheKey, CacheStats, ShipmentCache};
use crate::storage::config::{Config, FetchMode};
use crate::storage::snapshot::CacheStore;

// =============================================================================
// Builder
// =============================================================================

/// Assembles an [`Engine`] from config and adapters.
pub struct EngineBuilder {
    config: Config,
    adapters: Vec<SharedAdapter>,
    store: Option<Arc<dyn CacheStore>>,
}

impl EngineBuilder {
    /// Register an adapter. Registration order is catalog order.
    #[must_use]
    pub fn with_adapter(mut self, adapter: SharedAdapter) -> Self {
        self.adapters.push(adapter);
        self
    }

    #[must_use]
    pub fn with_adapters(mut self, adapters: impl IntoIterator<Item = SharedAdapter>) -> Self {
        self.adapters.extend(adapters);
        self
    }

    /// Persist cache snapshots to `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate config, seed the catalog, and wire the components together.
    ///
    /// # Errors
    /// Returns an error if the config is invalid.
    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;
        let config = self.config;

        let mut registry = AdapterRegistry::new();
        let mut catalog = ProviderCatalog::new();
        for adapter in self.adapters {
            let id = adapter.id().to_string();
            let descriptor = ProviderDescriptor::from_adapter(
                &id,
                &adapter.config(),
                adapter.is_available(),
                config.provider(&id),
            );
            tracing::debug!(
                provider = %id,
                tier = %descriptor.tier,
                available = descriptor.available,
                capacity = descriptor.rate_limit_capacity,
                "Provider registered"
            );
            catalog.insert(descriptor);
            registry.register(adapter);
        }
        let catalog = Arc::new(catalog);

        let ceilings: HashMap<String, f64> = catalog
            .iter()
            .filter_map(|d| d.daily_cost_ceiling.map(|c| (d.id.clone(), c)))
            .collect();

        let limiter = Arc::new(RateLimiter::from_catalog(&catalog));
        let health = Arc::new(HealthMonitor::new(config.health.clone()));
        let ledger = Arc::new(CostLedger::new(config.router.daily_cost_ceiling, ceilings));
        let metrics = Arc::new(EngineMetrics::new());
        let detector = CarrierDetector::new();
        let router = Arc::new(SmartRouter::new(
            config.router.clone(),
            Arc::clone(&catalog),
            Arc::clone(&health),
            Arc::clone(&limiter),
            Arc::clone(&ledger),
            detector,
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            config.engine.clone(),
            OrchestratorParts {
                catalog: Arc::clone(&catalog),
                adapters: registry.clone(),
                router,
                limiter: Arc::clone(&limiter),
                health: Arc::clone(&health),
                ledger: Arc::clone(&ledger),
                metrics: Arc::clone(&metrics),
            },
        ));
        let batch = BatchQueue::new(
            config.batch.clone(),
            Arc::clone(&orchestrator),
            Arc::clone(&metrics),
        );
        let cache = Arc::new(ShipmentCache::new(config.cache.clone()));

        Ok(Engine {
            config,
            catalog,
            adapters: registry,
            detector,
            limiter,
            health,
            ledger,
            metrics,
            cache,
            orchestrator,
            batch,
            store: self.store,
            background: Mutex::new(None),
        })
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Per-provider view returned by [`Engine::provider_stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub id: String,
    pub tier: ProviderTier,
    pub reliability: f64,
    pub available: bool,
    pub status: HealthStatus,
    pub success_rate: Option<f64>,
    pub avg_response_time_ms: f64,
    pub tokens_available: f64,
    pub capacity: u32,
    pub cost_per_request: f64,
    pub daily_cost: f64,
}

struct Background {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// The tracking engine.
pub struct Engine {
    config: Config,
    catalog: Arc<ProviderCatalog>,
    adapters: AdapterRegistry,
    detector: CarrierDetector,
    limiter: Arc<RateLimiter>,
    health: Arc<HealthMonitor>,
    ledger: Arc<CostLedger>,
    metrics: Arc<EngineMetrics>,
    cache: Arc<ShipmentCache>,
    orchestrator: Arc<Orchestrator>,
    batch: BatchQueue,
    store: Option<Arc<dyn CacheStore>>,
    background: Mutex<Option<Background>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("providers", &self.catalog.len())
            .field("cache", &self.cache.stats())
            .field("batch", &self.batch.stats())
            .finish_non_exhaustive()
    }
}

impl Engine {
    #[must_use]
    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder {
            config,
            adapters: Vec::new(),
            store: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn cache(&self) -> &ShipmentCache {
        &self.cache
    }

    #[must_use]
    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    #[must_use]
    pub fn batch_stats(&self) -> BatchStats {
        self.batch.stats()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Restore the cache snapshot and start the sweep and health-check tasks.
    ///
    /// Calling `start` on a running engine is a no-op.
    ///
    /// # Errors
    /// Returns an error if the snapshot store cannot be read.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.lock_background().is_some() {
            return Ok(());
        }

        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let entries = tokio::task::spawn_blocking(move || store.load())
                .await
                .map_err(|e| TrackError::Other(e.into()))??;
            let now = Utc::now();
            let restored = entries.len();
            for entry in entries {
                self.cache.restore_at(entry, now);
            }
            tracing::info!(entries = restored, "Cache snapshot restored");
        }

        let cancel = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(Arc::clone(self).sweep_loop(cancel.clone())),
            tokio::spawn(Arc::clone(self).health_check_loop(cancel.clone())),
        ];

        let mut background = self.lock_background();
        if background.is_some() {
            // Lost a race with a concurrent start.
            cancel.cancel();
            return Ok(());
        }
        *background = Some(Background { cancel, tasks });
        drop(background);

        tracing::info!(providers = self.catalog.len(), "Engine started");
        Ok(())
    }

    /// Stop background tasks, flush the batch queue, and persist the cache.
    ///
    /// New requests fail with `ShuttingDown` afterwards.
    ///
    /// # Errors
    /// Returns an error if the final snapshot cannot be written.
    pub async fn stop(&self) -> Result<()> {
        let background = self.lock_background().take();
        if let Some(background) = background {
            background.cancel.cancel();
            for task in background.tasks {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "Background task ended abnormally");
                }
            }
        }
        self.batch.shutdown().await;
        self.persist().await?;
        tracing::info!("Engine stopped");
        Ok(())
    }

    fn lock_background(&self) -> MutexGuard<'_, Option<Background>> {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the current cache contents to the store, if any.
    async fn persist(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let store = Arc::clone(store);
        let entries = self.cache.entries();
        tokio::task::spawn_blocking(move || store.save_all(&entries))
            .await
            .map_err(|e| TrackError::Other(e.into()))?
    }

    async fn sweep_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.config.cache.sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let demoted = self.cache.sweep();
                    if demoted > 0 {
                        tracing::debug!(demoted, "Cache sweep");
                    }
                    if let Err(e) = self.persist().await {
                        tracing::warn!(error = %e, "Failed to persist cache snapshot");
                    }
                }
            }
        }
    }

    /// Check providers that are down or unproven so they can recover.
    async fn health_check_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.config.health.health_check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => self.check_recovering_providers().await,
            }
        }
    }

    async fn check_recovering_providers(&self) {
        for adapter in self.adapters.iter() {
            let id = adapter.id();
            if !matches!(
                self.health.status(id),
                HealthStatus::Down | HealthStatus::Unknown
            ) {
                continue;
            }
            let started = Instant::now();
            let healthy = adapter.health_check().await;
            self.health.record(id, healthy, started.elapsed());
            tracing::debug!(provider = %id, healthy, "Health check");
        }
    }

    // -------------------------------------------------------------------------
    // Tracking
    // -------------------------------------------------------------------------

    /// Track a shipment, serving from cache when fresh.
    ///
    /// The tracking type is inferred from the number when omitted; priority
    /// defaults to medium. When every provider fails, a stale cached copy is
    /// returned if one exists.
    ///
    /// # Errors
    /// Returns `InvalidTrackingNumber`, `NoProviderAvailable`, `Timeout`, or
    /// `AllProvidersFailed` when no stale copy can stand in.
    pub async fn track_shipment(
        &self,
        tracking_number: &str,
        tracking_type: Option<TrackingType>,
        priority: Option<Priority>,
    ) -> Result<CanonicalShipment> {
        let started = Instant::now();
        let request = self.request(tracking_number, tracking_type, priority.unwrap_or_default())?;
        let key = CacheKey::new(&request.tracking_number, request.tracking_type);

        if let Some(hit) = self.cache.get(&key) {
            self.metrics.cache_hit();
            self.metrics.request_completed(started.elapsed());
            tracing::debug!(key = %key, "Cache hit");
            return Ok(hit);
        }
        self.metrics.cache_miss();

        let outcome = match self.fetch_queued(request).await {
            Ok(shipment) => Ok(shipment),
            Err(e) if e.allows_stale_fallback() => self.stale_or(&key, e),
            Err(e) => Err(e),
        };
        self.metrics.request_completed(started.elapsed());
        outcome
    }

    /// Fetch from every eligible provider, bypassing the cache and the batch queue.
    ///
    /// # Errors
    /// Same as [`Engine::track_shipment`], except no stale fallback is attempted.
    pub async fn refresh(
        &self,
        tracking_number: &str,
        tracking_type: Option<TrackingType>,
    ) -> Result<CanonicalShipment> {
        let started = Instant::now();
        let request = self.request(tracking_number, tracking_type, Priority::High)?;
        let number = request.tracking_number.clone();
        let cancel = CancellationToken::new();
        let deadline = self.config.engine.request_timeout();

        let fetched = timeout(
            deadline,
            self.orchestrator
                .fetch(&request, FetchMode::CollectAll, cancel.clone()),
        )
        .await;
        let outcome = match fetched {
            Ok(report) => report
                .and_then(|r| r.into_results(&number))
                .and_then(|results| self.store_resolved(request.tracking_type, &results)),
            Err(_) => {
                cancel.cancel();
                Err(TrackError::Timeout {
                    tracking_number: number,
                    after: deadline,
                })
            }
        };
        self.metrics.request_completed(started.elapsed());
        outcome
    }

    fn request(
        &self,
        tracking_number: &str,
        tracking_type: Option<TrackingType>,
        priority: Priority,
    ) -> Result<TrackingRequest> {
        let number = self.detector.validate(tracking_number)?;
        let tracking_type = tracking_type.unwrap_or_else(|| self.detector.infer_type(&number));
        Ok(TrackingRequest::new(&number, tracking_type, priority))
    }

    /// Go through the batch queue under the request deadline.
    async fn fetch_queued(&self, request: TrackingRequest) -> Result<CanonicalShipment> {
        let number = request.tracking_number.clone();
        let tracking_type = request.tracking_type;
        let cancel = CancellationToken::new();
        let deadline = self.config.engine.request_timeout();

        let ticket = self
            .batch
            .enqueue(request, self.config.engine.fetch_mode, cancel.clone());
        let results = match timeout(deadline, ticket).await {
            Ok(results) => results?,
            Err(_) => {
                // Only this request's calls observe the cancellation.
                cancel.cancel();
                tracing::warn!(
                    tracking_number = %number,
                    after_ms = deadline.as_millis(),
                    "Tracking request timed out"
                );
                return Err(TrackError::Timeout {
                    tracking_number: number,
                    after: deadline,
                });
            }
        };
        self.store_resolved(tracking_type, &results)
    }

    fn store_resolved(
        &self,
        tracking_type: TrackingType,
        results: &[RawResult],
    ) -> Result<CanonicalShipment> {
        let shipment = resolver::resolve(tracking_type, results)?;
        let key = CacheKey::new(&shipment.tracking_number, tracking_type);
        let ttl_ms = self.cache.set(key, shipment.clone());
        tracing::debug!(
            tracking_number = %shipment.tracking_number,
            source = %shipment.data_source,
            ttl_ms,
            "Shipment cached"
        );
        Ok(shipment)
    }

    fn stale_or(&self, key: &CacheKey, error: TrackError) -> Result<CanonicalShipment> {
        match self.cache.get_stale(key) {
            Some(stale) => {
                self.metrics.stale_served();
                tracing::warn!(
                    key = %key,
                    last_updated = %stale.last_updated,
                    error = %error,
                    "Serving stale shipment"
                );
                Ok(stale)
            }
            None => Err(error),
        }
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Static and live state of every provider, in catalog order.
    #[must_use]
    pub fn provider_stats(&self) -> Vec<ProviderStats> {
        self.catalog
            .iter()
            .map(|d| {
                let health = self.health.health(&d.id);
                let tokens = self.limiter.snapshot(&d.id);
                ProviderStats {
                    id: d.id.clone(),
                    tier: d.tier,
                    reliability: d.base_reliability,
                    available: d.available,
                    status: health.status,
                    success_rate: health.success_rate(),
                    avg_response_time_ms: health.avg_response_time_ms,
                    tokens_available: tokens.map_or(0.0, |t| t.available),
                    capacity: d.rate_limit_capacity,
                    cost_per_request: d.cost_per_request,
                    daily_cost: self.ledger.daily_total(&d.id),
                }
            })
            .collect()
    }

    /// Cache, latency, batching and cost figures since startup.
    #[must_use]
    pub fn optimization_metrics(&self) -> OptimizationMetrics {
        let avg_cost = self
            .ledger
            .average_call_cost()
            .unwrap_or_else(|| self.catalog.mean_cost());
        OptimizationMetrics::from_snapshot(self.metrics.snapshot(), avg_cost)
    }
}
