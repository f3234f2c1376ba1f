//! Provider fan-out.
//!
//! Calls the router's ranked providers with bounded concurrency, retrying each
//! provider per its failure kind, and records every real attempt in the rate
//! limiter, health monitor and cost ledger.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;

use super::adapter::AdapterRegistry;
use super::catalog::ProviderCatalog;
use super::cost_ledger::CostLedger;
use super::health::HealthMonitor;
use super::metrics::EngineMetrics;
use super::models::{ProviderError, RawResult, TrackingRequest};
use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use super::router::{RankedProvider, SmartRouter};
use crate::error::{ErrorKind, ProviderFailure, Result, TrackError};
use crate::storage::config::{EngineConfig, FetchMode};

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchReport {
    /// Successful results in arrival order.
    pub results: Vec<RawResult>,
    /// One entry per provider that ended in failure.
    pub errors: Vec<ProviderFailure>,
}

impl FetchReport {
    /// Successful results, or the aggregated failure when there are none.
    ///
    /// # Errors
    /// Returns `AllProvidersFailed` carrying every per-provider failure.
    pub fn into_results(self, tracking_number: &str) -> Result<Vec<RawResult>> {
        if self.results.is_empty() {
            Err(TrackError::AllProvidersFailed {
                tracking_number: tracking_number.to_string(),
                failures: self.errors,
            })
        } else {
            Ok(self.results)
        }
    }
}

/// Shared handles the orchestrator records into.
#[derive(Debug, Clone)]
pub struct OrchestratorParts {
    pub catalog: Arc<ProviderCatalog>,
    pub adapters: AdapterRegistry,
    pub router: Arc<SmartRouter>,
    pub limiter: Arc<RateLimiter>,
    pub health: Arc<HealthMonitor>,
    pub ledger: Arc<CostLedger>,
    pub metrics: Arc<EngineMetrics>,
}

/// Bounded-concurrency fan-out over ranked providers.
#[derive(Debug)]
pub struct Orchestrator {
    config: EngineConfig,
    retry: RetryPolicy,
    parts: OrchestratorParts,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: EngineConfig, parts: OrchestratorParts) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            config,
            retry,
            parts,
        }
    }

    /// The router this orchestrator ranks with.
    #[must_use]
    pub fn router(&self) -> &SmartRouter {
        &self.parts.router
    }

    /// Rank providers for a request and fan out over them.
    ///
    /// # Errors
    /// Returns `NoProviderAvailable` when routing finds no eligible provider. Provider
    /// failures are reported in the `FetchReport`, never as an `Err`.
    pub async fn fetch(
        &self,
        request: &TrackingRequest,
        mode: FetchMode,
        cancel: CancellationToken,
    ) -> Result<FetchReport> {
        let ranked = self.parts.router.select_providers(request)?;
        Ok(self.fetch_ranked(request, ranked, mode, cancel).await)
    }

    /// Fan out over an already ranked provider list.
    pub async fn fetch_ranked(
        &self,
        request: &TrackingRequest,
        ranked: Vec<RankedProvider>,
        mode: FetchMode,
        cancel: CancellationToken,
    ) -> FetchReport {
        let concurrency = match mode {
            FetchMode::CollectAll => self.config.max_concurrency,
            FetchMode::StopEarly => self.config.stop_early_concurrency(),
        }
        .max(1);

        // Cancelled when stop-early is satisfied so in-flight siblings stop too.
        let fanout = cancel.child_token();
        let mut report = FetchReport::default();

        let mut calls = futures::stream::iter(ranked.into_iter().map(|provider| {
            let token = fanout.clone();
            async move { self.call_provider(request, &provider.id, token).await }
        }))
        .buffer_unordered(concurrency);

        while let Some(result) = calls.next().await {
            if result.is_success() {
                report.results.push(result);
            } else {
                report.errors.push(result.to_failure());
            }

            if mode == FetchMode::StopEarly && self.satisfied(&report.results) {
                tracing::debug!(
                    tracking_number = %request.tracking_number,
                    results = report.results.len(),
                    "Stop-early condition met"
                );
                fanout.cancel();
                break;
            }
            if cancel.is_cancelled() {
                break;
            }
        }
        drop(calls);

        if report.results.is_empty() {
            tracing::warn!(
                tracking_number = %request.tracking_number,
                failures = report.errors.len(),
                "All providers failed"
            );
        }
        report
    }

    /// A single trusted result, or two successful results agreeing on status.
    fn satisfied(&self, results: &[RawResult]) -> bool {
        if results
            .iter()
            .any(|r| r.reliability >= self.config.stop_early_reliability)
        {
            return true;
        }
        let statuses: Vec<String> = results
            .iter()
            .filter_map(|r| r.payload.as_ref()?.status.as_deref())
            .map(|s| s.trim().to_lowercase())
            .collect();
        statuses
            .iter()
            .enumerate()
            .any(|(i, a)| statuses[i + 1..].contains(a))
    }

    /// Call one provider with retry, backoff and a hard per-attempt timeout.
    async fn call_provider(
        &self,
        request: &TrackingRequest,
        provider_id: &str,
        cancel: CancellationToken,
    ) -> RawResult {
        let number = request.tracking_number.as_str();
        let (reliability, cost) = self
            .parts
            .catalog
            .get(provider_id)
            .map_or((0.0, 0.0), |d| (d.base_reliability, d.cost_per_request));

        let Some(adapter) = self.parts.adapters.get(provider_id) else {
            return RawResult::failure(
                provider_id,
                number,
                ProviderError::new(ErrorKind::NoProviderAvailable, "adapter not registered"),
                reliability,
            );
        };

        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;

            if cancel.is_cancelled() {
                return cancelled(provider_id, number, reliability);
            }

            let result = if self.parts.limiter.try_acquire(provider_id) {
                let started = Instant::now();
                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    r = timeout(
                        self.config.call_timeout(),
                        adapter.fetch(number, request.tracking_type, cancel.clone()),
                    ) => Some(r),
                };
                let elapsed = started.elapsed();

                let Some(outcome) = outcome else {
                    return cancelled(provider_id, number, reliability);
                };
                let result = match outcome {
                    Ok(raw) => normalize(raw, provider_id, number, reliability),
                    Err(_) => RawResult::failure(
                        provider_id,
                        number,
                        ProviderError::new(
                            ErrorKind::Timeout,
                            format!("no answer within {}ms", self.config.call_timeout_ms),
                        ),
                        reliability,
                    ),
                };

                let responsive = result
                    .error_kind()
                    .is_none_or(|kind| !kind.counts_against_health());
                self.parts
                    .health
                    .record(provider_id, result.is_success() || responsive, elapsed);
                self.parts.ledger.record(provider_id, cost);
                self.parts.metrics.provider_call();

                tracing::debug!(
                    provider = provider_id,
                    tracking_number = number,
                    attempt,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    success = result.is_success(),
                    error = result.error_kind().map(ErrorKind::as_str),
                    "Provider attempt finished"
                );
                result
            } else {
                let wait = self.parts.limiter.time_until_available(provider_id);
                RawResult::failure(
                    provider_id,
                    number,
                    ProviderError::new(ErrorKind::RateLimit, "local rate limit exhausted")
                        .with_retry_after(wait),
                    reliability,
                )
            };

            if result.is_success() {
                return result;
            }

            let kind = result.error_kind().unwrap_or(ErrorKind::InvalidResponse);
            if !kind.is_retryable() || attempt >= attempts {
                return result;
            }

            let hint = result.error.as_ref().and_then(|e| e.retry_after);
            let delay = self.retry.delay_for(attempt, hint);
            tracing::debug!(
                provider = provider_id,
                tracking_number = number,
                attempt,
                kind = kind.as_str(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Retrying provider call"
            );

            tokio::select! {
                () = cancel.cancelled() => return cancelled(provider_id, number, reliability),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Stamp provenance from the catalog onto an adapter's answer.
fn normalize(mut raw: RawResult, provider_id: &str, number: &str, reliability: f64) -> RawResult {
    provider_id.clone_into(&mut raw.provider_id);
    number.clone_into(&mut raw.tracking_number);
    raw.reliability = reliability;
    raw
}

fn cancelled(provider_id: &str, number: &str, reliability: f64) -> RawResult {
    RawResult::failure(
        provider_id,
        number,
        ProviderError::new(ErrorKind::Timeout, "cancelled"),
        reliability,
    )
}
