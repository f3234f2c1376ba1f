//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux/macOS: `~/.config/shiptrack/config.toml`
//! - Windows: `%APPDATA%/shiptrack/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. Environment variables
//! 2. Config file
//! 3. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `SHIPTRACK_CONFIG`: Override config file path
//! - `SHIPTRACK_MAX_CONCURRENCY`: Fan-out bound per request
//! - `SHIPTRACK_CACHE_TTL_MS`: Base cache TTL in milliseconds
//! - `SHIPTRACK_BATCH_SIZE`: Bucket size that triggers an immediate flush
//! - `SHIPTRACK_BATCH_TIMEOUT_MS`: Bucket flush timer in milliseconds

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::core::models::{ProviderTier, TrackingType};
use crate::error::{Result, TrackError};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "SHIPTRACK_CONFIG";
/// Environment variable for the fan-out bound.
pub const ENV_MAX_CONCURRENCY: &str = "SHIPTRACK_MAX_CONCURRENCY";
/// Environment variable for the base cache TTL.
pub const ENV_CACHE_TTL_MS: &str = "SHIPTRACK_CACHE_TTL_MS";
/// Environment variable for the batch size.
pub const ENV_BATCH_SIZE: &str = "SHIPTRACK_BATCH_SIZE";
/// Environment variable for the batch flush timer.
pub const ENV_BATCH_TIMEOUT_MS: &str = "SHIPTRACK_BATCH_TIMEOUT_MS";

// =============================================================================
// Fetch Mode
// =============================================================================

/// How the orchestrator consumes the ranked provider list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMode {
    /// Query every ranked provider; used when conflict resolution wants many sources.
    CollectAll,
    /// Stop once a trusted result arrives or two results agree.
    #[default]
    StopEarly,
}

// =============================================================================
// Sections
// =============================================================================

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum concurrent provider calls per request.
    pub max_concurrency: usize,
    /// Concurrency used in stop-early mode. Unset means `max_concurrency`; a larger
    /// value is capped by it.
    pub stop_early_concurrency: Option<usize>,
    /// Attempts per provider call, including the first.
    pub retry_attempts: u32,
    /// First backoff delay; doubles per attempt.
    pub retry_base_delay_ms: u64,
    /// Backoff ceiling.
    pub retry_max_delay_ms: u64,
    /// Hard timeout for a single provider call.
    pub call_timeout_ms: u64,
    /// Deadline for a whole tracking request.
    pub request_timeout_ms: u64,
    /// Default mode for `track_shipment`.
    pub fetch_mode: FetchMode,
    /// Reliability at which stop-early mode accepts a single result.
    pub stop_early_reliability: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            stop_early_concurrency: None,
            retry_attempts: 3,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 5_000,
            call_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            fetch_mode: FetchMode::StopEarly,
            stop_early_reliability: 0.85,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Effective stop-early fan-out width.
    #[must_use]
    pub fn stop_early_concurrency(&self) -> usize {
        self.stop_early_concurrency
            .map_or(self.max_concurrency, |n| n.min(self.max_concurrency))
    }
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Base TTL before adaptive factors.
    pub default_ttl_ms: u64,
    /// Lower TTL clamp.
    pub min_ttl_ms: u64,
    /// Upper TTL clamp.
    pub max_ttl_ms: u64,
    /// Live entry capacity.
    pub max_entries: usize,
    /// Interval of the background sweep.
    pub sweep_interval_ms: u64,
    /// How long expired entries stay available for stale reads.
    pub stale_max_age_ms: u64,
    /// Optional SQLite file for warm starts.
    pub persist_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 15 * 60 * 1000,
            min_ttl_ms: 5 * 60 * 1000,
            max_ttl_ms: 60 * 60 * 1000,
            max_entries: 1_000,
            sweep_interval_ms: 60_000,
            stale_max_age_ms: 24 * 60 * 60 * 1000,
            persist_path: None,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Batch queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Bucket size that triggers an immediate flush.
    pub batch_size: usize,
    /// Flush timer started by the first enqueue into an empty bucket.
    pub batch_timeout_ms: u64,
    /// Re-enqueues allowed after a failed group call.
    pub max_retries: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_timeout_ms: 2_000,
            max_retries: 3,
        }
    }
}

impl BatchConfig {
    #[must_use]
    pub const fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

/// Health monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Samples kept per provider.
    pub window_size: usize,
    /// Samples older than this are ignored.
    pub window_ms: u64,
    /// Success rate at or above which a provider is healthy.
    pub healthy_threshold: f64,
    /// Success rate at or above which a provider is degraded (else down).
    pub degraded_threshold: f64,
    /// Samples required before a provider can be marked down.
    pub min_samples_for_down: usize,
    /// Interval of the background health check.
    pub health_check_interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            window_ms: 5 * 60 * 1000,
            healthy_threshold: 0.8,
            degraded_threshold: 0.5,
            min_samples_for_down: 3,
            health_check_interval_ms: 30_000,
        }
    }
}

impl HealthConfig {
    #[must_use]
    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

/// Router scoring constants.
///
/// These are empirically tuned; they are exposed so deployments can override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub tier_free: f64,
    pub tier_freemium: f64,
    pub tier_paid: f64,
    pub tier_premium: f64,
    pub health_healthy: f64,
    pub health_degraded: f64,
    pub health_unknown: f64,
    pub health_down: f64,
    /// Latency bonus ceiling; reduced by `avg_ms / latency_divisor_ms`.
    pub latency_max_bonus: f64,
    pub latency_divisor_ms: f64,
    /// Weight of the remaining-token fraction.
    pub capacity_weight: f64,
    /// Bonus when the tracking number matches one of the provider's carriers.
    pub carrier_match_bonus: f64,
    pub priority_high: f64,
    pub priority_medium: f64,
    pub priority_low: f64,
    /// Multiplier applied when a provider is over its daily cost ceiling.
    pub over_budget_multiplier: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            tier_free: 30.0,
            tier_freemium: 20.0,
            tier_paid: 15.0,
            tier_premium: 10.0,
            health_healthy: 25.0,
            health_degraded: 10.0,
            health_unknown: 0.0,
            health_down: -100.0,
            latency_max_bonus: 20.0,
            latency_divisor_ms: 100.0,
            capacity_weight: 15.0,
            carrier_match_bonus: 40.0,
            priority_high: 3.0,
            priority_medium: 2.0,
            priority_low: 1.0,
            over_budget_multiplier: 0.5,
        }
    }
}

/// Router settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Daily spend above which a provider's score is halved.
    pub daily_cost_ceiling: f64,
    pub weights: ScoringWeights,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            daily_cost_ceiling: 50.0,
            weights: ScoringWeights::default(),
        }
    }
}

/// Per-provider overrides and built-in HTTP adapter settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub id: String,
    pub tier: Option<ProviderTier>,
    pub reliability: Option<f64>,
    pub cost_per_request: Option<f64>,
    /// Tokens per refill window.
    pub rate_limit_capacity: Option<u32>,
    /// Refill window; capacity tokens are restored over this period.
    pub rate_limit_window_ms: Option<u64>,
    pub daily_cost_ceiling: Option<f64>,
    pub supported_types: Vec<TrackingType>,
    pub regions: Vec<String>,
    pub carriers: Vec<String>,
    /// Base URL for the built-in HTTP JSON adapter.
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,
}

// =============================================================================
// Config
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub health: HealthConfig,
    pub router: RouterConfig,
    pub providers: Vec<ProviderSettings>,
}

impl Config {
    /// Load from the default path, or `SHIPTRACK_CONFIG`, then apply env overrides
    /// and validate.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed, or validation fails.
    pub fn resolve() -> Result<Self> {
        let mut config = match std::env::var(ENV_CONFIG) {
            Ok(path) => Self::load_from(Path::new(&path))?,
            Err(_) => Self::load()?,
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location. Missing file yields defaults.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from a specific path. Missing file yields defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| TrackError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save to a specific path.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TrackError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Default config file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        AppPaths::new().config_file()
    }

    /// Apply `SHIPTRACK_*` overrides.
    ///
    /// # Errors
    /// Returns an error if an override is set but not a valid integer.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_u64(ENV_MAX_CONCURRENCY)? {
            self.engine.max_concurrency = usize::try_from(v).unwrap_or(usize::MAX);
        }
        if let Some(v) = env_u64(ENV_CACHE_TTL_MS)? {
            self.cache.default_ttl_ms = v;
        }
        if let Some(v) = env_u64(ENV_BATCH_SIZE)? {
            self.batch.batch_size = usize::try_from(v).unwrap_or(usize::MAX);
        }
        if let Some(v) = env_u64(ENV_BATCH_TIMEOUT_MS)? {
            self.batch.batch_timeout_ms = v;
        }
        Ok(())
    }

    /// Look up the settings block for a provider.
    #[must_use]
    pub fn provider(&self, id: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| {
            Err(TrackError::ConfigInvalid {
                key: key.to_string(),
                message: message.to_string(),
            })
        };

        if self.engine.max_concurrency == 0 {
            return invalid("engine.max_concurrency", "must be at least 1");
        }
        if self.engine.stop_early_concurrency == Some(0) {
            return invalid("engine.stop_early_concurrency", "must be at least 1");
        }
        if self.engine.retry_attempts == 0 {
            return invalid("engine.retry_attempts", "must be at least 1");
        }
        if self.engine.retry_max_delay_ms < self.engine.retry_base_delay_ms {
            return invalid(
                "engine.retry_max_delay_ms",
                "must not be below retry_base_delay_ms",
            );
        }
        if self.engine.call_timeout_ms == 0 || self.engine.request_timeout_ms == 0 {
            return invalid("engine.call_timeout_ms", "timeouts must be positive");
        }
        if !(0.0..=1.0).contains(&self.engine.stop_early_reliability) {
            return invalid("engine.stop_early_reliability", "must be within [0, 1]");
        }
        if self.cache.max_entries == 0 {
            return invalid("cache.max_entries", "must be at least 1");
        }
        if self.cache.min_ttl_ms == 0 || self.cache.min_ttl_ms > self.cache.max_ttl_ms {
            return invalid("cache.min_ttl_ms", "must be positive and not above max_ttl_ms");
        }
        if self.cache.sweep_interval_ms == 0 {
            return invalid("cache.sweep_interval_ms", "must be positive");
        }
        if self.batch.batch_size == 0 {
            return invalid("batch.batch_size", "must be at least 1");
        }
        if self.batch.batch_timeout_ms == 0 {
            return invalid("batch.batch_timeout_ms", "must be positive");
        }
        if self.health.window_size == 0 {
            return invalid("health.window_size", "must be at least 1");
        }
        if self.health.degraded_threshold > self.health.healthy_threshold {
            return invalid(
                "health.degraded_threshold",
                "must not exceed healthy_threshold",
            );
        }
        if self.health.health_check_interval_ms == 0 {
            return invalid("health.health_check_interval_ms", "must be positive");
        }
        if self.router.daily_cost_ceiling < 0.0 {
            return invalid("router.daily_cost_ceiling", "must not be negative");
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return invalid("providers.id", "must not be empty");
            }
            if !seen.insert(provider.id.as_str()) {
                return invalid("providers.id", &format!("duplicate id '{}'", provider.id));
            }
            if provider
                .reliability
                .is_some_and(|r| !(0.0..=1.0).contains(&r))
            {
                return invalid(
                    &format!("providers.{}.reliability", provider.id),
                    "must be within [0, 1]",
                );
            }
            if provider.cost_per_request.is_some_and(|c| c < 0.0) {
                return invalid(
                    &format!("providers.{}.cost_per_request", provider.id),
                    "must not be negative",
                );
            }
            if provider.rate_limit_capacity == Some(0) {
                return invalid(
                    &format!("providers.{}.rate_limit_capacity", provider.id),
                    "must be at least 1",
                );
            }
        }

        Ok(())
    }
}

fn env_u64(var: &str) -> Result<Option<u64>> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| TrackError::ConfigInvalid {
                key: var.to_string(),
                message: format!("'{value}' is not a non-negative integer"),
            }),
        _ => Ok(None),
    }
}
