//! End-to-end engine scenarios against scripted providers.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use futures::future::join_all;
use shiptrack::core::models::{Priority, TrackingType};
use shiptrack::storage::cache::CacheKey;
use shiptrack::storage::config::FetchMode;
use shiptrack::storage::snapshot::SqliteCacheStore;
use shiptrack::{
    ErrorKind, ExitCode, MockAdapter, MockResponse, TrackError, make_test_config, make_test_event,
    make_test_payload,
};
use tempfile::TempDir;

mod common;

use common::fixtures::{MAERSK_CONTAINER, builder_with, started_engine};
use common::logger::TestLogger;

#[tokio::test]
async fn disagreeing_providers_resolve_to_most_reliable() {
    let log = TestLogger::new("disagreeing_providers_resolve_to_most_reliable");

    log.phase("setup");
    let mut config = make_test_config();
    config.engine.fetch_mode = FetchMode::CollectAll;

    let mut weak_payload = make_test_payload("Delivered");
    weak_payload
        .timeline
        .push(make_test_event("Discharged", "Rotterdam, NL", 40_000));
    let strong = MockAdapter::new("alpha")
        .reliability(0.95)
        .respond(make_test_payload("In Transit"))
        .shared();
    let weak = MockAdapter::new("beta")
        .reliability(0.7)
        .respond(weak_payload)
        .shared();
    let engine = started_engine(config, vec![strong.clone(), weak.clone()]).await;

    log.phase("track");
    let shipment = engine
        .track_shipment(MAERSK_CONTAINER, None, Some(Priority::High))
        .await
        .unwrap();

    assert_eq!(shipment.data_source, "alpha");
    assert_eq!(shipment.status.as_deref(), Some("In Transit"));
    assert!(
        shipment.timeline.iter().any(|e| e.status == "Discharged"),
        "events only the weaker provider saw are kept"
    );
    assert_eq!(strong.calls(), 1);
    assert_eq!(weak.calls(), 1);

    engine.stop().await.unwrap();
    log.finish_ok();
}

#[tokio::test]
async fn second_lookup_is_served_from_cache() {
    let alpha = MockAdapter::new("alpha")
        .respond(make_test_payload("In Transit"))
        .shared();
    let engine = started_engine(make_test_config(), vec![alpha.clone()]).await;

    let first = engine
        .track_shipment(MAERSK_CONTAINER, None, Some(Priority::High))
        .await
        .unwrap();
    let second = engine
        .track_shipment("maeu 123 4567", None, Some(Priority::High))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(alpha.calls(), 1);
    let metrics = engine.optimization_metrics();
    assert_eq!(metrics.counters.cache_hits, 1);
    assert_eq!(metrics.counters.cache_misses, 1);
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn outage_serves_stale_copy_marked_stale() {
    let alpha = MockAdapter::new("alpha")
        .then(MockResponse::Success(make_test_payload("In Transit")))
        .fail(ErrorKind::NetworkError)
        .shared();
    let engine = started_engine(make_test_config(), vec![alpha.clone()]).await;

    let fresh = engine
        .track_shipment(MAERSK_CONTAINER, None, Some(Priority::High))
        .await
        .unwrap();
    assert!(!fresh.stale);

    // Age the entry past any TTL but within the stale window.
    let key = CacheKey::new(MAERSK_CONTAINER, TrackingType::Container);
    engine
        .cache()
        .set_at(key, fresh, Utc::now() - TimeDelta::hours(3));

    let served = engine
        .track_shipment(MAERSK_CONTAINER, None, Some(Priority::High))
        .await
        .unwrap();
    assert!(served.stale);
    assert_eq!(served.status.as_deref(), Some("In Transit"));
    assert_eq!(engine.optimization_metrics().counters.stale_serves, 1);
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn outage_without_cached_copy_reports_every_failure() {
    let auth = MockAdapter::new("alpha").fail(ErrorKind::AuthError).shared();
    let missing = MockAdapter::new("beta").fail(ErrorKind::NotFound).shared();
    let mut config = make_test_config();
    config.engine.fetch_mode = FetchMode::CollectAll;
    let engine = started_engine(config, vec![auth, missing]).await;

    let err = engine
        .track_shipment(MAERSK_CONTAINER, None, Some(Priority::High))
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), ExitCode::GeneralError);
    let kinds: Vec<ErrorKind> = err.provider_failures().iter().map(|f| f.kind).collect();
    assert!(kinds.contains(&ErrorKind::AuthError));
    assert!(kinds.contains(&ErrorKind::NotFound));
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn full_bucket_dispatches_one_batch() {
    let mut config = make_test_config();
    config.batch.batch_size = 5;
    config.batch.batch_timeout_ms = 60_000;
    let alpha = MockAdapter::new("alpha")
        .respond(make_test_payload("In Transit"))
        .shared();
    let engine = started_engine(config, vec![alpha.clone()]).await;

    let numbers = [
        "MAEU1000001",
        "MAEU1000002",
        "MAEU1000003",
        "MAEU1000004",
        "MAEU1000005",
    ];
    let outcomes = join_all(
        numbers
            .iter()
            .map(|n| engine.track_shipment(n, None, Some(Priority::Medium))),
    )
    .await;

    assert!(outcomes.iter().all(Result::is_ok));
    let mut requested = alpha.requested();
    requested.sort();
    assert_eq!(requested, numbers);

    let counters = engine.optimization_metrics().counters;
    assert_eq!(counters.batches_flushed, 1);
    assert_eq!(counters.groups_dispatched, 1);
    assert_eq!(counters.requests_batched, 5);
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn no_registered_provider_is_reported() {
    let engine = started_engine(make_test_config(), Vec::new()).await;

    let err = engine
        .track_shipment(MAERSK_CONTAINER, None, Some(Priority::High))
        .await
        .unwrap_err();

    assert!(matches!(err, TrackError::NoProviderAvailable { .. }));
    assert_eq!(err.exit_code(), ExitCode::NoProvider);
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn snapshot_warms_next_engine() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("snapshot.sqlite");

    let first = MockAdapter::new("alpha")
        .respond(make_test_payload("In Transit"))
        .shared();
    let engine = Arc::new(
        builder_with(make_test_config(), vec![first.clone()])
            .with_store(Arc::new(SqliteCacheStore::open(&path).unwrap()))
            .build()
            .unwrap(),
    );
    engine.start().await.unwrap();
    engine
        .track_shipment(MAERSK_CONTAINER, None, Some(Priority::High))
        .await
        .unwrap();
    engine.stop().await.unwrap();

    let second = MockAdapter::new("alpha")
        .respond(make_test_payload("Delivered"))
        .shared();
    let restarted = Arc::new(
        builder_with(make_test_config(), vec![second.clone()])
            .with_store(Arc::new(SqliteCacheStore::open(&path).unwrap()))
            .build()
            .unwrap(),
    );
    restarted.start().await.unwrap();
    let shipment = restarted
        .track_shipment(MAERSK_CONTAINER, None, Some(Priority::High))
        .await
        .unwrap();

    assert_eq!(shipment.status.as_deref(), Some("In Transit"));
    assert_eq!(second.calls(), 0);
    restarted.stop().await.unwrap();
}
