//! Per-provider token buckets.
//!
//! Buckets refill continuously: the token count is recomputed from elapsed time on
//! every access, so no background refill task is needed.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::catalog::ProviderCatalog;

#[derive(Debug, Clone)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    /// Tokens restored per second.
    refill_rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32, window: Duration, now: Instant) -> Self {
        let capacity = f64::from(capacity.max(1));
        let window_secs = window.as_secs_f64().max(f64::EPSILON);
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / window_secs,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = elapsed.mul_add(self.refill_rate, self.tokens).min(self.capacity);
            self.last_refill = now;
        }
    }

    fn time_until_token(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }
}

/// Snapshot of a provider's bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenSnapshot {
    pub available: f64,
    pub capacity: f64,
}

impl TokenSnapshot {
    /// Fraction of the bucket that is full, in [0, 1].
    #[must_use]
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity <= 0.0 {
            0.0
        } else {
            (self.available / self.capacity).clamp(0.0, 1.0)
        }
    }
}

/// Token bucket rate limiter keyed by provider id.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Create one full bucket per catalog entry.
    #[must_use]
    pub fn from_catalog(catalog: &ProviderCatalog) -> Self {
        let limiter = Self::default();
        let now = Instant::now();
        {
            let mut buckets = limiter.lock();
            for descriptor in catalog.iter() {
                buckets.insert(
                    descriptor.id.clone(),
                    Bucket::new(
                        descriptor.rate_limit_capacity,
                        descriptor.rate_limit_window,
                        now,
                    ),
                );
            }
        }
        limiter
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register (or reset) a provider's bucket.
    pub fn register(&self, provider_id: &str, capacity: u32, window: Duration) {
        self.lock().insert(
            provider_id.to_string(),
            Bucket::new(capacity, window, Instant::now()),
        );
    }

    /// Take one token if available.
    ///
    /// Unknown providers are never throttled.
    pub fn try_acquire(&self, provider_id: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.lock();
        let Some(bucket) = buckets.get_mut(provider_id) else {
            return true;
        };
        bucket.refill(now);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            tracing::debug!(
                provider = provider_id,
                tokens = bucket.tokens,
                "Rate limit bucket empty"
            );
            false
        }
    }

    /// Current bucket state, after refilling.
    #[must_use]
    pub fn snapshot(&self, provider_id: &str) -> Option<TokenSnapshot> {
        let now = Instant::now();
        let mut buckets = self.lock();
        buckets.get_mut(provider_id).map(|bucket| {
            bucket.refill(now);
            TokenSnapshot {
                available: bucket.tokens,
                capacity: bucket.capacity,
            }
        })
    }

    /// Whether at least one whole token is available.
    #[must_use]
    pub fn has_token(&self, provider_id: &str) -> bool {
        self.snapshot(provider_id)
            .is_none_or(|snapshot| snapshot.available >= 1.0)
    }

    /// How long until the next token is available.
    #[must_use]
    pub fn time_until_available(&self, provider_id: &str) -> Duration {
        let now = Instant::now();
        let mut buckets = self.lock();
        buckets.get_mut(provider_id).map_or(Duration::ZERO, |bucket| {
            bucket.refill(now);
            bucket.time_until_token()
        })
    }
}
