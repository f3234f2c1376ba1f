//! HTTP JSON adapter against a mock provider API.

use std::sync::Arc;
use std::time::Duration;

use shiptrack::core::adapter::ProviderAdapter;
use shiptrack::core::models::{Priority, ResultStatus, TrackingType};
use shiptrack::providers::adapters_from_config;
use shiptrack::providers::http_json::HttpJsonAdapter;
use shiptrack::storage::config::{Config, ProviderSettings};
use shiptrack::{Engine, ErrorKind, make_test_config};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

use common::fixtures::{MAERSK_CONTAINER, payload_document};
use common::logger::TestLogger;

const TRACK_PATH: &str = "/track/container/MAEU1234567";

fn settings(server: &MockServer) -> ProviderSettings {
    ProviderSettings {
        id: "mockline".to_string(),
        base_url: Some(server.uri()),
        ..ProviderSettings::default()
    }
}

fn adapter(server: &MockServer) -> HttpJsonAdapter {
    HttpJsonAdapter::from_settings(&settings(server), Duration::from_secs(5)).unwrap()
}

async fn fetch(adapter: &HttpJsonAdapter) -> shiptrack::core::models::RawResult {
    adapter
        .fetch(
            MAERSK_CONTAINER,
            TrackingType::Container,
            CancellationToken::new(),
        )
        .await
}

async fn respond_with(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TRACK_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn success_parses_payload() {
    let log = TestLogger::new("success_parses_payload");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TRACK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload_document("In Transit")))
        .expect(1)
        .mount(&server)
        .await;

    log.http_request("GET", &format!("{}{TRACK_PATH}", server.uri()));
    let result = fetch(&adapter(&server)).await;

    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(result.provider_id, "mockline");
    let payload = result.payload.unwrap();
    assert_eq!(payload.status.as_deref(), Some("In Transit"));
    assert_eq!(payload.timeline.len(), 2);
    assert_eq!(payload.containers[0].size_type.as_deref(), Some("40HC"));
    assert_eq!(payload.vessel.unwrap().name, "MAERSK ESSEN");
    log.finish_ok();
}

#[tokio::test]
async fn status_codes_map_to_error_kinds() {
    for (status, kind) in [
        (401, ErrorKind::AuthError),
        (403, ErrorKind::AuthError),
        (404, ErrorKind::NotFound),
        (500, ErrorKind::NetworkError),
        (503, ErrorKind::NetworkError),
        (400, ErrorKind::InvalidResponse),
    ] {
        let server = respond_with(status).await;
        let result = fetch(&adapter(&server)).await;
        assert_eq!(result.status, ResultStatus::Error, "status {status}");
        assert_eq!(result.error_kind(), Some(kind), "status {status}");
    }
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TRACK_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let result = fetch(&adapter(&server)).await;
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::RateLimit);
    assert_eq!(error.retry_after, Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TRACK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let result = fetch(&adapter(&server)).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::InvalidResponse));
}

#[tokio::test]
async fn slow_provider_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TRACK_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(payload_document("In Transit"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let adapter =
        HttpJsonAdapter::from_settings(&settings(&server), Duration::from_millis(200)).unwrap();
    let result = fetch(&adapter).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));
}

#[tokio::test]
async fn cancellation_abandons_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TRACK_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result = adapter
        .fetch(MAERSK_CONTAINER, TrackingType::Container, cancel)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
#[allow(unsafe_code)]
async fn api_key_is_sent_as_bearer_token() {
    const KEY_VAR: &str = "SHIPTRACK_IT_MOCKLINE_KEY";
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TRACK_PATH))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload_document("Loaded")))
        .expect(1)
        .mount(&server)
        .await;

    let mut with_key = settings(&server);
    with_key.api_key_env = Some(KEY_VAR.to_string());

    let missing = HttpJsonAdapter::from_settings(&with_key, Duration::from_secs(5)).unwrap();
    assert!(!missing.is_available(), "a declared key that is unset disables the provider");

    // Only this test in this binary touches the variable.
    unsafe {
        std::env::set_var(KEY_VAR, "s3cret");
    }
    let keyed = HttpJsonAdapter::from_settings(&with_key, Duration::from_secs(5)).unwrap();
    unsafe {
        std::env::remove_var(KEY_VAR);
    }

    assert!(keyed.is_available());
    let result = fetch(&keyed).await;
    assert_eq!(result.status, ResultStatus::Success);
}

#[tokio::test]
async fn health_check_hits_health_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    assert!(adapter(&server).health_check().await);

    let down = respond_with(200).await;
    assert!(!adapter(&down).health_check().await);
}

#[tokio::test]
async fn engine_tracks_through_configured_http_provider() {
    let log = TestLogger::new("engine_tracks_through_configured_http_provider");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TRACK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload_document("In Transit")))
        .expect(1)
        .mount(&server)
        .await;

    log.phase("setup");
    let mut config: Config = make_test_config();
    let mut provider = settings(&server);
    provider.reliability = Some(0.95);
    config.providers.push(provider);
    let adapters = adapters_from_config(&config).unwrap();
    assert_eq!(adapters.len(), 1);

    let engine = Arc::new(Engine::builder(config).with_adapters(adapters).build().unwrap());
    engine.start().await.unwrap();

    log.phase("track");
    let shipment = engine
        .track_shipment(MAERSK_CONTAINER, None, Some(Priority::High))
        .await
        .unwrap();
    assert_eq!(shipment.data_source, "mockline");
    assert_eq!(shipment.carrier.as_deref(), Some("maersk"));
    assert!((shipment.reliability - 0.95).abs() < f64::EPSILON);

    // Cached: the mock's expect(1) fails on a second call.
    engine
        .track_shipment(MAERSK_CONTAINER, None, Some(Priority::High))
        .await
        .unwrap();
    engine.stop().await.unwrap();
    log.finish_ok();
}
