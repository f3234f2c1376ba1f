//! Engine counters and the optimization summary derived from them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Lock-free counters updated on the hot path.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    stale_serves: AtomicU64,
    requests: AtomicU64,
    request_latency_ms: AtomicU64,
    provider_calls: AtomicU64,
    batches_flushed: AtomicU64,
    groups_dispatched: AtomicU64,
    requests_batched: AtomicU64,
}

impl EngineMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stale_served(&self) {
        self.stale_serves.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed `track_shipment`/`refresh` call.
    pub fn request_completed(&self, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.request_latency_ms.fetch_add(
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    pub fn provider_call(&self) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one bucket flush that dispatched `requests` across `groups` call-sets.
    pub fn batch_flushed(&self, groups: usize, requests: usize) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.groups_dispatched
            .fetch_add(groups as u64, Ordering::Relaxed);
        self.requests_batched
            .fetch_add(requests as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            request_latency_ms: self.request_latency_ms.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            groups_dispatched: self.groups_dispatched.load(Ordering::Relaxed),
            requests_batched: self.requests_batched.load(Ordering::Relaxed),
        }
    }
}

/// Raw counter values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub stale_serves: u64,
    pub requests: u64,
    pub request_latency_ms: u64,
    pub provider_calls: u64,
    pub batches_flushed: u64,
    pub groups_dispatched: u64,
    pub requests_batched: u64,
}

/// Summary reported by `Engine::optimization_metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationMetrics {
    /// Cache hits over cache lookups, 0 before the first lookup.
    pub cache_hit_rate: f64,
    /// Mean end-to-end latency of tracking requests.
    pub avg_response_time_ms: f64,
    /// Mean requests per dispatched batch group.
    pub batch_efficiency: f64,
    /// Estimated spend avoided by cache hits.
    pub cost_savings: f64,
    pub counters: MetricsSnapshot,
}

impl OptimizationMetrics {
    /// Derive the summary from counters and the average cost of a provider call.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_snapshot(counters: MetricsSnapshot, avg_call_cost: f64) -> Self {
        let lookups = counters.cache_hits + counters.cache_misses;
        let ratio = |num: u64, den: u64| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        Self {
            cache_hit_rate: ratio(counters.cache_hits, lookups),
            avg_response_time_ms: ratio(counters.request_latency_ms, counters.requests),
            batch_efficiency: ratio(counters.requests_batched, counters.groups_dispatched),
            cost_savings: counters.cache_hits as f64 * avg_call_cost,
            counters,
        }
    }
}
