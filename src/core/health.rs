//! Rolling per-provider health.
//!
//! Status is derived from the most recent samples only, so it is recomputed on
//! every read instead of being stored.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::storage::config::HealthConfig;

/// Health classification of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Down => "down",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time health of one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub provider_id: String,
    pub status: HealthStatus,
    /// Successful samples in the window.
    pub rolling_success: u32,
    /// Failed samples in the window.
    pub rolling_failure: u32,
    /// Mean response time over the window, 0 when there are no samples.
    pub avg_response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ProviderHealth {
    fn unknown(provider_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            status: HealthStatus::Unknown,
            rolling_success: 0,
            rolling_failure: 0,
            avg_response_time_ms: 0.0,
            last_checked_at: None,
        }
    }

    /// Fraction of successful samples, if any.
    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.rolling_success + self.rolling_failure;
        (total > 0).then(|| f64::from(self.rolling_success) / f64::from(total))
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    success: bool,
    response_ms: f64,
    at: Instant,
}

#[derive(Debug, Default)]
struct ProviderWindow {
    samples: VecDeque<Sample>,
    last_checked_at: Option<DateTime<Utc>>,
}

/// Tracks a bounded window of call outcomes per provider.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    windows: Mutex<HashMap<String, ProviderWindow>>,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProviderWindow>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one call outcome.
    pub fn record(&self, provider_id: &str, success: bool, elapsed: Duration) {
        let now = Instant::now();
        let max_age = Duration::from_millis(self.config.window_ms);
        let mut windows = self.lock();
        let window = windows.entry(provider_id.to_string()).or_default();

        window.samples.push_back(Sample {
            success,
            response_ms: elapsed.as_secs_f64() * 1000.0,
            at: now,
        });
        window.last_checked_at = Some(Utc::now());

        while window.samples.len() > self.config.window_size {
            window.samples.pop_front();
        }
        while window
            .samples
            .front()
            .is_some_and(|s| now.saturating_duration_since(s.at) > max_age)
        {
            window.samples.pop_front();
        }

        tracing::trace!(
            provider = provider_id,
            success,
            samples = window.samples.len(),
            "Health sample recorded"
        );
    }

    /// Current health for a provider. Providers with no samples are `unknown`.
    #[must_use]
    pub fn health(&self, provider_id: &str) -> ProviderHealth {
        let now = Instant::now();
        let max_age = Duration::from_millis(self.config.window_ms);
        let windows = self.lock();
        let Some(window) = windows.get(provider_id) else {
            return ProviderHealth::unknown(provider_id);
        };

        let live: Vec<&Sample> = window
            .samples
            .iter()
            .filter(|s| now.saturating_duration_since(s.at) <= max_age)
            .collect();

        let success = u32::try_from(live.iter().filter(|s| s.success).count()).unwrap_or(u32::MAX);
        let failure = u32::try_from(live.len()).unwrap_or(u32::MAX) - success;
        let avg = if live.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let n = live.len() as f64;
            live.iter().map(|s| s.response_ms).sum::<f64>() / n
        };

        ProviderHealth {
            provider_id: provider_id.to_string(),
            status: self.classify(success, failure),
            rolling_success: success,
            rolling_failure: failure,
            avg_response_time_ms: avg,
            last_checked_at: window.last_checked_at,
        }
    }

    /// Shorthand for `health(id).status`.
    #[must_use]
    pub fn status(&self, provider_id: &str) -> HealthStatus {
        self.health(provider_id).status
    }

    fn classify(&self, success: u32, failure: u32) -> HealthStatus {
        let total = success + failure;
        if total == 0 {
            return HealthStatus::Unknown;
        }
        let rate = f64::from(success) / f64::from(total);
        if rate >= self.config.healthy_threshold {
            HealthStatus::Healthy
        } else if rate >= self.config.degraded_threshold {
            HealthStatus::Degraded
        } else if usize::try_from(total).unwrap_or(usize::MAX) >= self.config.min_samples_for_down {
            HealthStatus::Down
        } else {
            HealthStatus::Degraded
        }
    }
}
