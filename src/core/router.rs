//! Smart provider routing.
//!
//! Ranks the providers that can serve a request by combining catalog metadata,
//! rolling health, rate-limit headroom, carrier specialization and spend.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use super::catalog::{ProviderCatalog, ProviderDescriptor};
use super::cost_ledger::CostLedger;
use super::detector::CarrierDetector;
use super::health::{HealthMonitor, HealthStatus, ProviderHealth};
use super::models::{Priority, ProviderTier, TrackingRequest};
use super::rate_limiter::RateLimiter;
use crate::error::{Result, TrackError};
use crate::storage::config::{RouterConfig, ScoringWeights};

/// A provider chosen for a request, with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedProvider {
    pub id: String,
    pub score: f64,
}

/// Ranks eligible providers per request.
#[derive(Debug)]
pub struct SmartRouter {
    config: RouterConfig,
    catalog: Arc<ProviderCatalog>,
    health: Arc<HealthMonitor>,
    limiter: Arc<RateLimiter>,
    ledger: Arc<CostLedger>,
    detector: CarrierDetector,
}

impl SmartRouter {
    #[must_use]
    pub const fn new(
        config: RouterConfig,
        catalog: Arc<ProviderCatalog>,
        health: Arc<HealthMonitor>,
        limiter: Arc<RateLimiter>,
        ledger: Arc<CostLedger>,
        detector: CarrierDetector,
    ) -> Self {
        Self {
            config,
            catalog,
            health,
            limiter,
            ledger,
            detector,
        }
    }

    /// Rank the providers eligible for a request, best first.
    ///
    /// Eligible means: supports the tracking type, was available at startup, has at
    /// least one rate-limit token, and is not down. Ties keep catalog order.
    ///
    /// # Errors
    /// Returns `NoProviderAvailable` when no provider is eligible.
    pub fn select_providers(&self, request: &TrackingRequest) -> Result<Vec<RankedProvider>> {
        let carrier = self.detector.carrier_for(&request.tracking_number);

        let mut ranked: Vec<(usize, RankedProvider)> = self
            .catalog
            .iter()
            .enumerate()
            .filter_map(|(pos, descriptor)| {
                if !descriptor.available || !descriptor.supports(request.tracking_type) {
                    return None;
                }
                let health = self.health.health(&descriptor.id);
                if health.status == HealthStatus::Down {
                    return None;
                }
                let tokens = self.limiter.snapshot(&descriptor.id)?;
                if tokens.available < 1.0 {
                    return None;
                }
                let score = self.score(
                    descriptor,
                    &health,
                    tokens.fill_ratio(),
                    carrier.as_deref(),
                    request.priority,
                );
                Some((
                    pos,
                    RankedProvider {
                        id: descriptor.id.clone(),
                        score,
                    },
                ))
            })
            .collect();

        if ranked.is_empty() {
            tracing::warn!(
                tracking_number = %request.tracking_number,
                tracking_type = %request.tracking_type,
                "No eligible provider"
            );
            return Err(TrackError::NoProviderAvailable {
                tracking_number: request.tracking_number.clone(),
                tracking_type: request.tracking_type.to_string(),
            });
        }

        ranked.sort_by(|(pa, a), (pb, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(pa.cmp(pb))
        });

        let ranked: Vec<RankedProvider> = ranked.into_iter().map(|(_, r)| r).collect();
        tracing::debug!(
            tracking_number = %request.tracking_number,
            carrier = carrier.as_deref().unwrap_or("-"),
            ranking = ?ranked.iter().map(|r| (r.id.as_str(), r.score)).collect::<Vec<_>>(),
            "Providers ranked"
        );
        Ok(ranked)
    }

    /// Top choice for a request, if any provider is eligible.
    #[must_use]
    pub fn top_choice(&self, request: &TrackingRequest) -> Option<String> {
        self.select_providers(request)
            .ok()
            .and_then(|ranked| ranked.into_iter().next().map(|r| r.id))
    }

    fn score(
        &self,
        descriptor: &ProviderDescriptor,
        health: &ProviderHealth,
        fill_ratio: f64,
        carrier: Option<&str>,
        priority: Priority,
    ) -> f64 {
        let w = &self.config.weights;

        let mut score = tier_score(w, descriptor.tier)
            + health_score(w, health.status)
            + (w.latency_max_bonus - health.avg_response_time_ms / w.latency_divisor_ms).max(0.0)
            + fill_ratio * w.capacity_weight;

        if carrier.is_some_and(|c| descriptor.covers_carrier(c)) {
            score += w.carrier_match_bonus;
        }

        score *= priority_multiplier(w, priority);

        let ceiling = descriptor
            .daily_cost_ceiling
            .unwrap_or(self.config.daily_cost_ceiling);
        if self.ledger.daily_total(&descriptor.id) > ceiling {
            score *= w.over_budget_multiplier;
        }

        score
    }
}

const fn tier_score(w: &ScoringWeights, tier: ProviderTier) -> f64 {
    match tier {
        ProviderTier::Free => w.tier_free,
        ProviderTier::Freemium => w.tier_freemium,
        ProviderTier::Paid => w.tier_paid,
        ProviderTier::Premium => w.tier_premium,
    }
}

const fn health_score(w: &ScoringWeights, status: HealthStatus) -> f64 {
    match status {
        HealthStatus::Healthy => w.health_healthy,
        HealthStatus::Degraded => w.health_degraded,
        HealthStatus::Unknown => w.health_unknown,
        HealthStatus::Down => w.health_down,
    }
}

const fn priority_multiplier(w: &ScoringWeights, priority: Priority) -> f64 {
    match priority {
        Priority::High => w.priority_high,
        Priority::Medium => w.priority_medium,
        Priority::Low => w.priority_low,
    }
}
