//! Test utilities for shiptrack.
//!
//! Provides a scripted in-memory provider adapter and data factories for use
//! across unit and integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use shiptrack::test_utils::*;
//!
//! let alpha = MockAdapter::new("alpha")
//!     .reliability(0.95)
//!     .respond(make_test_payload("In Transit"))
//!     .shared();
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use crate::core::adapter::{AdapterConfig, ProviderAdapter};
use crate::core::models::{
    Container, ProviderError, ProviderTier, RawResult, Route, ShipmentEvent, ShipmentPayload,
    TrackingType, Vessel,
};
use crate::error::ErrorKind;
use crate::storage::config::Config;

// =============================================================================
// Mock Adapter
// =============================================================================

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Success(ShipmentPayload),
    Failure(ProviderError),
    /// Never answers; resolves only when cancelled.
    Hang,
}

/// Scripted provider adapter.
///
/// Answers come from the script queue first, then from the fallback response.
#[derive(Debug)]
pub struct MockAdapter {
    id: String,
    config: AdapterConfig,
    available: AtomicBool,
    healthy: AtomicBool,
    delay: Duration,
    script: Mutex<VecDeque<MockResponse>>,
    fallback: MockResponse,
    calls: AtomicUsize,
    cancelled: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl MockAdapter {
    /// A free, available provider supporting every tracking type.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            config: AdapterConfig {
                reliability: 0.9,
                supported_types: TrackingType::ALL.to_vec(),
                tier: ProviderTier::Free,
                rate_limit_capacity: 100,
                cost_per_request: 0.0,
                carriers: Vec::new(),
                regions: Vec::new(),
            },
            available: AtomicBool::new(true),
            healthy: AtomicBool::new(true),
            delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            fallback: MockResponse::Failure(ProviderError::new(
                ErrorKind::NotFound,
                "no scripted response",
            )),
            calls: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub const fn reliability(mut self, reliability: f64) -> Self {
        self.config.reliability = reliability;
        self
    }

    #[must_use]
    pub const fn tier(mut self, tier: ProviderTier) -> Self {
        self.config.tier = tier;
        self
    }

    #[must_use]
    pub const fn cost(mut self, cost: f64) -> Self {
        self.config.cost_per_request = cost;
        self
    }

    #[must_use]
    pub const fn capacity(mut self, capacity: u32) -> Self {
        self.config.rate_limit_capacity = capacity;
        self
    }

    #[must_use]
    pub fn carriers(mut self, carriers: &[&str]) -> Self {
        self.config.carriers = carriers.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn types(mut self, types: &[TrackingType]) -> Self {
        self.config.supported_types = types.to_vec();
        self
    }

    /// Simulated latency of every call.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    /// Answer every unscripted call with this payload.
    #[must_use]
    pub fn respond(mut self, payload: ShipmentPayload) -> Self {
        self.fallback = MockResponse::Success(payload);
        self
    }

    /// Fail every unscripted call with this kind.
    #[must_use]
    pub fn fail(mut self, kind: ErrorKind) -> Self {
        self.fallback = MockResponse::Failure(ProviderError::new(kind, format!("{kind}")));
        self
    }

    /// Never answer unscripted calls.
    #[must_use]
    pub fn hang(mut self) -> Self {
        self.fallback = MockResponse::Hang;
        self
    }

    /// Queue a one-shot answer ahead of the fallback.
    #[must_use]
    pub fn then(self, response: MockResponse) -> Self {
        self.push(response);
        self
    }

    /// Queue a one-shot answer on a shared adapter.
    pub fn push(&self, response: MockResponse) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of `fetch` calls made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of calls that observed cancellation.
    #[must_use]
    pub fn cancelled_calls(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Tracking numbers requested, in call order.
    #[must_use]
    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn next_response(&self) -> MockResponse {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn cancelled_result(&self, tracking_number: &str) -> RawResult {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        RawResult::failure(
            &self.id,
            tracking_number,
            ProviderError::new(ErrorKind::Timeout, "cancelled"),
            self.config.reliability,
        )
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(
        &self,
        tracking_number: &str,
        _tracking_type: TrackingType,
        cancel: CancellationToken,
    ) -> RawResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tracking_number.to_string());

        if !self.delay.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => return self.cancelled_result(tracking_number),
                () = tokio::time::sleep(self.delay) => {}
            }
        }

        match self.next_response() {
            MockResponse::Success(payload) => {
                RawResult::success(&self.id, tracking_number, payload, self.config.reliability)
            }
            MockResponse::Failure(error) => {
                RawResult::failure(&self.id, tracking_number, error, self.config.reliability)
            }
            MockResponse::Hang => {
                cancel.cancelled().await;
                self.cancelled_result(tracking_number)
            }
        }
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn config(&self) -> AdapterConfig {
        self.config.clone()
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Test Data Factories
// =============================================================================

/// A fixed reference time, so fixtures are reproducible.
#[must_use]
pub fn reference_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-03-10T12:00:00Z")
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

/// An event `minutes` after the reference time.
#[must_use]
pub fn make_test_event(status: &str, location: &str, minutes: i64) -> ShipmentEvent {
    ShipmentEvent {
        timestamp: reference_time() + TimeDelta::minutes(minutes),
        status: status.to_string(),
        location: Some(location.to_string()),
        description: None,
    }
}

/// A realistic payload with the given status.
#[must_use]
pub fn make_test_payload(status: &str) -> ShipmentPayload {
    ShipmentPayload {
        carrier: Some("maersk".to_string()),
        service: Some("AE7".to_string()),
        status: Some(status.to_string()),
        timeline: vec![
            make_test_event("Gate In", "Shanghai, CN", 0),
            make_test_event("Loaded", "Shanghai, CN", 600),
        ],
        containers: vec![Container {
            number: "MAEU1234567".to_string(),
            size_type: Some("40HC".to_string()),
            seal: None,
        }],
        vessel: Some(Vessel {
            name: "MAERSK ESSEN".to_string(),
            imo: Some("9632179".to_string()),
            voyage: Some("312W".to_string()),
        }),
        route: Some(Route {
            origin: "CNSHA".to_string(),
            destination: "NLRTM".to_string(),
            eta: Some(reference_time() + TimeDelta::days(30)),
        }),
        last_updated: Some(reference_time()),
    }
}

/// A payload carrying only a status.
#[must_use]
pub fn make_test_payload_minimal(status: &str) -> ShipmentPayload {
    ShipmentPayload {
        status: Some(status.to_string()),
        ..ShipmentPayload::default()
    }
}

/// A successful result fetched at the reference time.
#[must_use]
pub fn make_test_result(provider_id: &str, reliability: f64, payload: ShipmentPayload) -> RawResult {
    RawResult::success(provider_id, "MAEU1234567", payload, reliability)
        .fetched_at(reference_time())
}

/// A failed result.
#[must_use]
pub fn make_test_failure(provider_id: &str, kind: ErrorKind) -> RawResult {
    RawResult::failure(
        provider_id,
        "MAEU1234567",
        ProviderError::new(kind, kind.to_string()),
        0.9,
    )
}

/// Config with tiny delays and timers suited to tests.
#[must_use]
pub fn make_test_config() -> Config {
    let mut config = Config::default();
    config.engine.retry_base_delay_ms = 1;
    config.engine.retry_max_delay_ms = 5;
    config.engine.call_timeout_ms = 1_000;
    config.engine.request_timeout_ms = 5_000;
    config.batch.batch_timeout_ms = 50;
    config
}
