//! Generic JSON-over-HTTP tracking adapter.
//!
//! Talks to any provider exposing `GET {base_url}/track/{type}/{number}` that
//! answers with a shipment payload document. Configured from a `[[providers]]`
//! entry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tokio_util::sync::CancellationToken;

use crate::core::adapter::{AdapterConfig, ProviderAdapter};
use crate::core::http::{build_client, classify_status, classify_transport, retry_after};
use crate::core::models::{
    ProviderError, ProviderTier, RawResult, ShipmentPayload, TrackingType,
};
use crate::error::{ErrorKind, Result, TrackError};
use crate::storage::config::ProviderSettings;

/// Reliability assumed for a provider with no configured value.
pub const DEFAULT_RELIABILITY: f64 = 0.8;

/// Token bucket size assumed for a provider with no configured value.
pub const DEFAULT_CAPACITY: u32 = 60;

/// Adapter for a configured HTTP JSON provider.
#[derive(Debug, Clone)]
pub struct HttpJsonAdapter {
    id: String,
    base_url: String,
    api_key: Option<String>,
    key_required: bool,
    config: AdapterConfig,
    client: Client,
}

impl HttpJsonAdapter {
    /// Build from a provider entry. The API key is read from `api_key_env` now.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` when `base_url` is missing, or a network error if
    /// the HTTP client cannot be built.
    pub fn from_settings(settings: &ProviderSettings, timeout: Duration) -> Result<Self> {
        let base_url = settings
            .base_url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| TrackError::ConfigInvalid {
                key: format!("providers.{}.base_url", settings.id),
                message: "required for HTTP providers".to_string(),
            })?;

        let api_key = settings
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.trim().is_empty());

        let config = AdapterConfig {
            reliability: settings.reliability.unwrap_or(DEFAULT_RELIABILITY),
            supported_types: if settings.supported_types.is_empty() {
                TrackingType::ALL.to_vec()
            } else {
                settings.supported_types.clone()
            },
            tier: settings.tier.unwrap_or(ProviderTier::Paid),
            rate_limit_capacity: settings.rate_limit_capacity.unwrap_or(DEFAULT_CAPACITY),
            cost_per_request: settings.cost_per_request.unwrap_or(0.0),
            carriers: settings.carriers.clone(),
            regions: settings.regions.clone(),
        };

        Ok(Self {
            id: settings.id.clone(),
            base_url,
            api_key,
            key_required: settings.api_key_env.is_some(),
            config,
            client: build_client(timeout)?,
        })
    }

    fn track_url(&self, tracking_number: &str, tracking_type: TrackingType) -> String {
        format!(
            "{}/track/{}/{}",
            self.base_url,
            tracking_type.as_str(),
            tracking_number
        )
    }

    async fn request(&self, url: &str) -> std::result::Result<ShipmentPayload, ProviderError> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::new(classify_transport(&e), e.to_string()))?;

        parse_response(response).await
    }
}

async fn parse_response(response: Response) -> std::result::Result<ShipmentPayload, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let kind = classify_status(status);
        let mut error = ProviderError::new(kind, format!("HTTP {status}"));
        if kind == ErrorKind::RateLimit
            && let Some(wait) = retry_after(response.headers())
        {
            error = error.with_retry_after(wait);
        }
        return Err(error);
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| ProviderError::new(classify_transport(&e), e.to_string()))?;
    serde_json::from_slice(&body)
        .map_err(|e| ProviderError::new(ErrorKind::InvalidResponse, e.to_string()))
}

#[async_trait]
impl ProviderAdapter for HttpJsonAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(
        &self,
        tracking_number: &str,
        tracking_type: TrackingType,
        cancel: CancellationToken,
    ) -> RawResult {
        let url = self.track_url(tracking_number, tracking_type);
        tracing::trace!(provider = %self.id, url = %url, "HTTP fetch");

        let outcome = tokio::select! {
            () = cancel.cancelled() => Err(ProviderError::new(ErrorKind::Timeout, "cancelled")),
            outcome = self.request(&url) => outcome,
        };

        match outcome {
            Ok(payload) => {
                RawResult::success(&self.id, tracking_number, payload, self.config.reliability)
            }
            Err(error) => {
                tracing::debug!(
                    provider = %self.id,
                    kind = %error.kind,
                    message = %error.message,
                    "HTTP fetch failed"
                );
                RawResult::failure(&self.id, tracking_number, error, self.config.reliability)
            }
        }
    }

    fn is_available(&self) -> bool {
        !self.key_required || self.api_key.is_some()
    }

    fn config(&self) -> AdapterConfig {
        self.config.clone()
    }

    /// `GET {base_url}/health` answers 2xx.
    async fn health_check(&self) -> bool {
        if !self.is_available() {
            return false;
        }
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
