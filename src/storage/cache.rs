//! Adaptive-TTL shipment cache.
//!
//! Canonical shipments are cached per `(tracking number, tracking type)` with a TTL
//! derived from how trustworthy, how fresh and how final the data is. Expired and
//! LRU-evicted entries move to a stale tier that only the last-resort fallback reads.
//!
//! The stale tier is bounded: entries whose `created_at` is older than
//! `stale_max_age_ms` are purged on sweep, and the tier never holds more than
//! `max_entries`, dropping the oldest first. A stale read returns the latest copy
//! regardless of age, but only while that copy is inside these bounds.
//!
//! # Features
//! - Adaptive TTL, clamped to `[min_ttl_ms, max_ttl_ms]`
//! - Lazy expiry on `get` plus a proactive `sweep`
//! - Amortized LRU: one batch eviction of the oldest 10% when full
//! - Stale reads that ignore TTL
//!
//! Every time-dependent operation has an `_at` variant taking an explicit `now`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::models::{CanonicalShipment, TrackingType};
use crate::storage::config::CacheConfig;

/// TTL multipliers.
const RELIABILITY_HIGH: (f64, f64) = (0.9, 1.5);
const RELIABILITY_GOOD: (f64, f64) = (0.8, 1.2);
const FRESH_SECS: i64 = 60;
const RECENT_SECS: i64 = 5 * 60;
const FRESH_FACTOR: f64 = 1.3;
const RECENT_FACTOR: f64 = 1.1;
const OLD_FACTOR: f64 = 0.8;
const DELIVERED_FACTOR: f64 = 2.0;
const IN_TRANSIT_FACTOR: f64 = 0.8;

/// Fraction of capacity evicted in one batch.
const EVICTION_FRACTION: f64 = 0.1;

// =============================================================================
// Keys and Entries
// =============================================================================

/// Cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub tracking_number: String,
    pub tracking_type: TrackingType,
}

impl CacheKey {
    #[must_use]
    pub fn new(tracking_number: &str, tracking_type: TrackingType) -> Self {
        Self {
            tracking_number: tracking_number.to_string(),
            tracking_type,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tracking_type, self.tracking_number)
    }
}

/// One cached shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: CacheKey,
    pub data: CanonicalShipment,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: u64,
    pub access_count: u64,
    pub last_accessed_at: DateTime<Utc>,
    pub source_provider: String,
}

impl CacheEntry {
    /// Whether the entry outlived its TTL at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let age = (now - self.created_at).num_milliseconds();
        age > i64::try_from(self.ttl_ms).unwrap_or(i64::MAX)
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
    pub stale_entries: usize,
}

// =============================================================================
// TTL
// =============================================================================

/// Adaptive TTL for a shipment, in milliseconds.
///
/// `base x reliability x freshness x status`, clamped to the configured bounds.
#[must_use]
pub fn compute_ttl(config: &CacheConfig, data: &CanonicalShipment, now: DateTime<Utc>) -> u64 {
    let reliability = if data.reliability > RELIABILITY_HIGH.0 {
        RELIABILITY_HIGH.1
    } else if data.reliability > RELIABILITY_GOOD.0 {
        RELIABILITY_GOOD.1
    } else {
        1.0
    };

    let age_secs = (now - data.last_updated).num_seconds();
    let freshness = if age_secs < FRESH_SECS {
        FRESH_FACTOR
    } else if age_secs < RECENT_SECS {
        RECENT_FACTOR
    } else {
        OLD_FACTOR
    };

    let status = match data.status.as_deref().map(|s| s.trim().to_lowercase()) {
        Some(s) if s == "delivered" => DELIVERED_FACTOR,
        Some(s) if s == "in transit" => IN_TRANSIT_FACTOR,
        _ => 1.0,
    };

    #[allow(clippy::cast_precision_loss)]
    let raw = config.default_ttl_ms as f64 * reliability * freshness * status;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let ttl = raw.round() as u64;
    ttl.clamp(config.min_ttl_ms, config.max_ttl_ms)
}

// =============================================================================
// Cache
// =============================================================================

#[derive(Debug, Default)]
struct CacheInner {
    live: HashMap<CacheKey, CacheEntry>,
    stale: HashMap<CacheKey, CacheEntry>,
    stats: CacheStats,
}

impl CacheInner {
    fn demote(&mut self, key: &CacheKey) {
        if let Some(entry) = self.live.remove(key) {
            self.stats.expirations += 1;
            self.stale.insert(key.clone(), entry);
        }
    }
}

/// Adaptive-TTL LRU cache of canonical shipments.
///
/// A key is held in at most one tier at a time.
#[derive(Debug)]
pub struct ShipmentCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl ShipmentCache {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live lookup; see [`Self::get_at`].
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<CanonicalShipment> {
        self.get_at(key, Utc::now())
    }

    /// Live lookup. Expired entries are treated as absent and demoted.
    #[must_use]
    pub fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CanonicalShipment> {
        let mut inner = self.lock();

        let expired = match inner.live.get(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired_at(now),
        };

        if expired {
            tracing::debug!(key = %key, "Cache entry expired");
            inner.demote(key);
            inner.stats.misses += 1;
            return None;
        }

        inner.stats.hits += 1;
        let entry = inner.live.get_mut(key)?;
        entry.access_count += 1;
        entry.last_accessed_at = now;
        Some(entry.data.clone())
    }

    /// Insert; see [`Self::set_at`].
    pub fn set(&self, key: CacheKey, data: CanonicalShipment) -> u64 {
        self.set_at(key, data, Utc::now())
    }

    /// Insert or replace an entry, returning its TTL in milliseconds.
    ///
    /// Inserting a new key into a full cache first evicts the least recently
    /// accessed 10% of entries in one batch.
    pub fn set_at(&self, key: CacheKey, mut data: CanonicalShipment, now: DateTime<Utc>) -> u64 {
        data.stale = false;
        let ttl_ms = compute_ttl(&self.config, &data, now);
        let mut inner = self.lock();

        if !inner.live.contains_key(&key) && inner.live.len() >= self.config.max_entries {
            self.evict_batch(&mut inner);
        }

        inner.stale.remove(&key);
        let source_provider = data.data_source.clone();
        inner.live.insert(
            key.clone(),
            CacheEntry {
                key,
                data,
                created_at: now,
                ttl_ms,
                access_count: 0,
                last_accessed_at: now,
                source_provider,
            },
        );
        ttl_ms
    }

    fn evict_batch(&self, inner: &mut CacheInner) {
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let count = ((self.config.max_entries as f64 * EVICTION_FRACTION).ceil() as usize).max(1);

        let mut by_access: Vec<(DateTime<Utc>, DateTime<Utc>, CacheKey)> = inner
            .live
            .values()
            .map(|e| (e.last_accessed_at, e.created_at, e.key.clone()))
            .collect();
        by_access.sort();

        for (_, _, key) in by_access.into_iter().take(count) {
            if let Some(entry) = inner.live.remove(&key) {
                inner.stale.insert(key, entry);
                inner.stats.evictions += 1;
            }
        }
        self.trim_stale(inner);
        tracing::debug!(evicted = count, remaining = inner.live.len(), "Cache batch eviction");
    }

    /// Keep the stale tier no larger than the live capacity, oldest out first.
    fn trim_stale(&self, inner: &mut CacheInner) {
        if inner.stale.len() <= self.config.max_entries {
            return;
        }
        let mut by_age: Vec<(DateTime<Utc>, CacheKey)> = inner
            .stale
            .values()
            .map(|e| (e.created_at, e.key.clone()))
            .collect();
        by_age.sort();
        let excess = inner.stale.len() - self.config.max_entries;
        for (_, key) in by_age.into_iter().take(excess) {
            inner.stale.remove(&key);
        }
    }

    /// Last-resort read that ignores TTL.
    ///
    /// Returns the most recent entry for the key from either tier, flagged `stale`
    /// and carrying its original `last_updated`.
    #[must_use]
    pub fn get_stale(&self, key: &CacheKey) -> Option<CanonicalShipment> {
        let inner = self.lock();
        inner
            .live
            .get(key)
            .or_else(|| inner.stale.get(key))
            .map(|entry| {
                let mut data = entry.data.clone();
                data.stale = true;
                data
            })
    }

    /// Drop a key from both tiers.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let mut inner = self.lock();
        let live = inner.live.remove(key).is_some();
        inner.stale.remove(key).is_some() || live
    }

    /// Proactive expiry; see [`Self::sweep_at`].
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Demote expired live entries and purge stale entries past `stale_max_age_ms`.
    ///
    /// Returns the number of entries demoted.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.lock();

        let expired: Vec<CacheKey> = inner
            .live
            .values()
            .filter(|e| e.is_expired_at(now))
            .map(|e| e.key.clone())
            .collect();
        for key in &expired {
            inner.demote(key);
        }

        let max_age = i64::try_from(self.config.stale_max_age_ms).unwrap_or(i64::MAX);
        inner
            .stale
            .retain(|_, e| (now - e.created_at).num_milliseconds() <= max_age);

        self.trim_stale(&mut inner);

        if !expired.is_empty() {
            tracing::debug!(
                demoted = expired.len(),
                live = inner.live.len(),
                stale = inner.stale.len(),
                "Cache sweep"
            );
        }
        expired.len()
    }

    /// Re-insert a persisted entry, keeping its timestamps.
    ///
    /// Expired entries land in the stale tier; entries beyond capacity are dropped.
    pub fn restore_at(&self, entry: CacheEntry, now: DateTime<Utc>) {
        let mut inner = self.lock();
        if inner.live.contains_key(&entry.key) || inner.stale.contains_key(&entry.key) {
            return;
        }
        if entry.is_expired_at(now) {
            inner.stale.insert(entry.key.clone(), entry);
        } else if inner.live.len() < self.config.max_entries {
            inner.live.insert(entry.key.clone(), entry);
        }
    }

    /// All entries from both tiers, for persistence.
    #[must_use]
    pub fn entries(&self) -> Vec<CacheEntry> {
        let inner = self.lock();
        inner
            .live
            .values()
            .chain(inner.stale.values())
            .cloned()
            .collect()
    }

    /// Live entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.live.len(),
            stale_entries: inner.stale.len(),
            ..inner.stats
        }
    }
}
