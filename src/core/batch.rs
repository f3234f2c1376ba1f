//! Priority batch queue.
//!
//! High-priority requests dispatch immediately. Medium and low requests wait in a
//! bucket per `(tracking type, priority)` until the bucket fills or its flush timer
//! fires. A flush ranks every request once, groups requests by their top provider,
//! and dispatches each group over those rankings with the group's provider first.
//! Every request still completes through its own ticket.
//!
//! A request that fails on every provider is re-enqueued up to `max_retries` times.
//! Failures from each round are kept on the request, so when it runs out of retries
//! or stops being routable it still resolves with every provider's last failure.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::metrics::EngineMetrics;
use super::models::{Priority, RawResult, TrackingRequest, TrackingType};
use super::orchestrator::Orchestrator;
use super::router::RankedProvider;
use crate::error::{ProviderFailure, Result, TrackError};
use crate::storage::config::{BatchConfig, FetchMode};

type Completion = oneshot::Sender<Result<Vec<RawResult>>>;

/// A request buffered by the queue.
#[derive(Debug)]
pub struct QueuedRequest {
    pub id: Uuid,
    pub request: TrackingRequest,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub mode: FetchMode,
    /// Per-request cancellation; never shared with siblings.
    pub cancel: CancellationToken,
    /// Latest failure per provider across every round so far.
    failures: Vec<ProviderFailure>,
    completion: Completion,
}

impl QueuedRequest {
    /// Resolve the ticket. A dropped ticket is ignored.
    fn complete(self, outcome: Result<Vec<RawResult>>) {
        let _ = self.completion.send(outcome);
    }

    /// Resolve with the failures gathered across rounds, or `error` if there are none.
    fn fail(self, error: TrackError) {
        let Self {
            request,
            failures,
            completion,
            ..
        } = self;
        let error = if failures.is_empty() {
            error
        } else {
            TrackError::AllProvidersFailed {
                tracking_number: request.tracking_number,
                failures,
            }
        };
        let _ = completion.send(Err(error));
    }

    /// Fold one round's failures in. A provider's newer failure replaces its older one.
    fn absorb(&mut self, round: Vec<ProviderFailure>) {
        for failure in round {
            match self
                .failures
                .iter_mut()
                .find(|f| f.provider_id == failure.provider_id)
            {
                Some(existing) => *existing = failure,
                None => self.failures.push(failure),
            }
        }
    }

    fn abandoned(&self) -> bool {
        self.completion.is_closed() || self.cancel.is_cancelled()
    }
}

type Member = (QueuedRequest, Vec<RankedProvider>);

/// Completion handle returned by [`BatchQueue::enqueue`].
///
/// Resolves exactly once with the request's successful provider results.
#[derive(Debug)]
pub struct BatchTicket {
    id: Uuid,
    rx: oneshot::Receiver<Result<Vec<RawResult>>>,
}

impl BatchTicket {
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }
}

impl Future for BatchTicket {
    type Output = Result<Vec<RawResult>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(TrackError::Dropped(id.to_string()))))
    }
}

/// Queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Requests waiting in buckets.
    pub pending: usize,
    /// Non-empty buckets.
    pub buckets: usize,
}

type BucketKey = (TrackingType, Priority);

#[derive(Debug, Default)]
struct Bucket {
    requests: Vec<QueuedRequest>,
    /// Bumped on every flush so a stale timer cannot flush a newer batch.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl Bucket {
    fn take(&mut self) -> Vec<QueuedRequest> {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        std::mem::take(&mut self.requests)
    }
}

struct Shared {
    config: BatchConfig,
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<EngineMetrics>,
    buckets: Mutex<HashMap<BucketKey, Bucket>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

/// Priority-lane request buffer in front of the orchestrator.
#[derive(Clone)]
pub struct BatchQueue {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for BatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchQueue")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl BatchQueue {
    #[must_use]
    pub fn new(
        config: BatchConfig,
        orchestrator: Arc<Orchestrator>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                orchestrator,
                metrics,
                buckets: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Queue a request and return its completion ticket.
    ///
    /// `cancel` belongs to this request alone; cancelling it abandons the request
    /// without affecting others in the same batch.
    pub fn enqueue(
        &self,
        request: TrackingRequest,
        mode: FetchMode,
        cancel: CancellationToken,
    ) -> BatchTicket {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let queued = QueuedRequest {
            id,
            request,
            enqueued_at: Utc::now(),
            retry_count: 0,
            max_retries: self.shared.config.max_retries,
            mode,
            cancel,
            failures: Vec::new(),
            completion: tx,
        };

        if self.shared.shutdown.is_cancelled() {
            queued.complete(Err(TrackError::ShuttingDown));
        } else {
            tracing::debug!(
                id = %id,
                tracking_number = %queued.request.tracking_number,
                priority = %queued.request.priority,
                "Request enqueued"
            );
            Shared::push(&self.shared, queued);
        }

        BatchTicket { id, rx }
    }

    /// Buffered request counts.
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        let buckets = self.shared.lock();
        BatchStats {
            pending: buckets.values().map(|b| b.requests.len()).sum(),
            buckets: buckets.values().filter(|b| !b.requests.is_empty()).count(),
        }
    }

    /// Stop timers, flush every bucket, and wait for in-flight dispatches.
    ///
    /// Requests enqueued afterwards fail with `ShuttingDown`.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();

        let drained: Vec<QueuedRequest> = {
            let mut buckets = self.shared.lock();
            buckets.values_mut().flat_map(Bucket::take).collect()
        };
        if !drained.is_empty() {
            tracing::info!(requests = drained.len(), "Flushing batch queue on shutdown");
            Shared::flush(&self.shared, drained).await;
        }

        self.shared.tasks.close();
        self.shared.tasks.wait().await;
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<BucketKey, Bucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route a request into its lane.
    fn push(this: &Arc<Self>, queued: QueuedRequest) {
        if queued.request.priority == Priority::High {
            let shared = Arc::clone(this);
            this.tasks
                .spawn(async move { Self::flush(&shared, vec![queued]).await });
            return;
        }

        let key = (queued.request.tracking_type, queued.request.priority);
        let full = {
            let mut buckets = this.lock();
            let bucket = buckets.entry(key).or_default();
            bucket.requests.push(queued);

            if bucket.requests.len() >= this.config.batch_size {
                Some(bucket.take())
            } else {
                if bucket.requests.len() == 1 {
                    bucket.timer = Some(Self::start_timer(this, key, bucket.generation));
                }
                None
            }
        };

        if let Some(batch) = full {
            tracing::debug!(
                tracking_type = %key.0,
                priority = %key.1,
                size = batch.len(),
                "Bucket full, flushing"
            );
            let shared = Arc::clone(this);
            this.tasks
                .spawn(async move { Self::flush(&shared, batch).await });
        }
    }

    fn start_timer(this: &Arc<Self>, key: BucketKey, generation: u64) -> JoinHandle<()> {
        let shared = Arc::clone(this);
        let delay = this.config.batch_timeout();
        this.tasks.spawn(async move {
            tokio::select! {
                () = shared.shutdown.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let batch = {
                        let mut buckets = shared.lock();
                        match buckets.get_mut(&key) {
                            Some(bucket) if bucket.generation == generation => {
                                // The timer is finishing on its own; don't abort it.
                                bucket.timer = None;
                                bucket.take()
                            }
                            _ => Vec::new(),
                        }
                    };
                    if !batch.is_empty() {
                        tracing::debug!(
                            tracking_type = %key.0,
                            priority = %key.1,
                            size = batch.len(),
                            "Batch timer fired"
                        );
                        Self::flush(&shared, batch).await;
                    }
                }
            }
        })
    }

    /// Group a batch by top provider and dispatch every group concurrently.
    async fn flush(this: &Arc<Self>, batch: Vec<QueuedRequest>) {
        let router = this.orchestrator.router();
        let mut groups: Vec<(String, Vec<Member>)> = Vec::new();
        let mut total = 0;

        for queued in batch {
            if queued.abandoned() {
                continue;
            }
            match router.select_providers(&queued.request) {
                Ok(ranked) => {
                    let top = ranked.first().map(|r| r.id.clone()).unwrap_or_default();
                    total += 1;
                    match groups.iter_mut().find(|(id, _)| *id == top) {
                        Some((_, members)) => members.push((queued, ranked)),
                        None => groups.push((top, vec![(queued, ranked)])),
                    }
                }
                Err(e) => {
                    if queued.retry_count > 0 {
                        tracing::warn!(
                            id = %queued.id,
                            tracking_number = %queued.request.tracking_number,
                            retries = queued.retry_count,
                            error = %e,
                            "Retried request is no longer routable"
                        );
                    }
                    queued.fail(e);
                }
            }
        }

        if groups.is_empty() {
            return;
        }
        this.metrics.batch_flushed(groups.len(), total);
        tracing::debug!(groups = groups.len(), requests = total, "Dispatching batch");

        join_all(
            groups
                .into_iter()
                .map(|(provider, members)| Self::dispatch_group(this, provider, members)),
        )
        .await;
    }

    /// Run one group's requests together over their flush-time rankings, each led
    /// by the group's provider. Each request resolves or retries on its own.
    async fn dispatch_group(this: &Arc<Self>, provider: String, members: Vec<Member>) {
        let orchestrator = &this.orchestrator;
        let reports = join_all(members.iter().map(|(queued, ranked)| {
            orchestrator.fetch_ranked(
                &queued.request,
                led_by(ranked, &provider),
                queued.mode,
                queued.cancel.clone(),
            )
        }))
        .await;

        for ((mut queued, _), report) in members.into_iter().zip(reports) {
            match report.into_results(&queued.request.tracking_number) {
                Ok(results) => queued.complete(Ok(results)),
                Err(TrackError::AllProvidersFailed {
                    tracking_number,
                    failures,
                }) => {
                    if queued.abandoned() {
                        continue;
                    }
                    queued.absorb(failures);
                    if queued.retry_count < queued.max_retries && !this.shutdown.is_cancelled() {
                        queued.retry_count += 1;
                        tracing::info!(
                            id = %queued.id,
                            tracking_number = %queued.request.tracking_number,
                            provider = %provider,
                            retry = queued.retry_count,
                            "Group call failed, re-enqueueing"
                        );
                        Self::push(this, queued);
                    } else {
                        tracing::warn!(
                            id = %queued.id,
                            tracking_number = %queued.request.tracking_number,
                            requester = queued.request.requester.as_deref().unwrap_or("-"),
                            retries = queued.retry_count,
                            failures = queued.failures.len(),
                            "Request failed permanently"
                        );
                        queued.fail(TrackError::AllProvidersFailed {
                            tracking_number,
                            failures: Vec::new(),
                        });
                    }
                }
                Err(e) => queued.complete(Err(e)),
            }
        }
    }
}

/// `ranked` reordered so `provider` leads; the rest keep their order.
fn led_by(ranked: &[RankedProvider], provider: &str) -> Vec<RankedProvider> {
    let mut ordered = ranked.to_vec();
    if let Some(pos) = ordered.iter().position(|r| r.id == provider) {
        ordered[..=pos].rotate_right(1);
    }
    ordered
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as Map;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::core::adapter::{AdapterRegistry, SharedAdapter};
    use crate::core::catalog::{ProviderCatalog, ProviderDescriptor};
    use crate::core::cost_ledger::CostLedger;
    use crate::core::detector::CarrierDetector;
    use crate::core::health::HealthMonitor;
    use crate::core::orchestrator::OrchestratorParts;
    use crate::core::rate_limiter::RateLimiter;
    use crate::core::router::SmartRouter;
    use crate::error::ErrorKind;
    use crate::storage::config::{Config, HealthConfig};
    use crate::core::models::ProviderError;
    use crate::test_utils::{MockAdapter, MockResponse, make_test_config, make_test_payload};

    fn queue(config: &Config, adapters: Vec<SharedAdapter>) -> (BatchQueue, Arc<EngineMetrics>) {
        let mut registry = AdapterRegistry::new();
        let mut catalog = ProviderCatalog::new();
        for adapter in adapters {
            catalog.insert(ProviderDescriptor::from_adapter(
                adapter.id(),
                &adapter.config(),
                true,
                None,
            ));
            registry.register(adapter);
        }
        let catalog = Arc::new(catalog);
        let limiter = Arc::new(RateLimiter::from_catalog(&catalog));
        let health = Arc::new(HealthMonitor::new(HealthConfig::default()));
        let ledger = Arc::new(CostLedger::new(50.0, Map::new()));
        let metrics = Arc::new(EngineMetrics::new());
        let router = Arc::new(SmartRouter::new(
            config.router.clone(),
            catalog.clone(),
            health.clone(),
            limiter.clone(),
            ledger.clone(),
            CarrierDetector::new(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            config.engine.clone(),
            OrchestratorParts {
                catalog,
                adapters: registry,
                router,
                limiter,
                health,
                ledger,
                metrics: metrics.clone(),
            },
        ));
        (
            BatchQueue::new(config.batch.clone(), orchestrator, metrics.clone()),
            metrics,
        )
    }

    fn config() -> Config {
        let mut config = make_test_config();
        config.batch.batch_timeout_ms = 2_000;
        config.batch.batch_size = 10;
        config.engine.retry_attempts = 1;
        config.engine.stop_early_concurrency = Some(1);
        config
    }

    fn req(number: &str, priority: Priority) -> TrackingRequest {
        TrackingRequest::new(number, TrackingType::Container, priority).with_requester("batch-test")
    }

    #[tokio::test(start_paused = true)]
    async fn single_request_waits_for_the_timer() {
        let a = MockAdapter::new("a").respond(make_test_payload("Loaded")).shared();
        let (queue, _) = queue(&config(), vec![a.clone()]);

        let started = Instant::now();
        let ticket = queue.enqueue(req("ABCU1234567", Priority::Medium), FetchMode::StopEarly, CancellationToken::new());
        assert_eq!(queue.stats().pending, 1);

        let results = ticket.await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(started.elapsed() >= Duration::from_millis(2_000));
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_bucket_dispatches_immediately() {
        let a = MockAdapter::new("a").respond(make_test_payload("Loaded")).shared();
        let (queue, metrics) = queue(&config(), vec![a.clone()]);

        let started = Instant::now();
        let tickets: Vec<_> = (0..10)
            .map(|i| {
                queue.enqueue(
                    req(&format!("ABCU{i:07}"), Priority::Low),
                    FetchMode::StopEarly,
                    CancellationToken::new(),
                )
            })
            .collect();
        assert_eq!(queue.stats().pending, 0);

        for outcome in join_all(tickets).await {
            assert!(outcome.is_ok());
        }
        assert!(started.elapsed() < Duration::from_millis(2_000));
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_flushed, 1);
        assert_eq!(snapshot.requests_batched, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn high_priority_bypasses_buckets() {
        let a = MockAdapter::new("a").respond(make_test_payload("Loaded")).shared();
        let (queue, _) = queue(&config(), vec![a.clone()]);

        let started = Instant::now();
        let ticket = queue.enqueue(req("ABCU1234567", Priority::High), FetchMode::StopEarly, CancellationToken::new());
        assert_eq!(queue.stats().pending, 0);
        ticket.await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn lanes_are_separate_buckets() {
        let a = MockAdapter::new("a").respond(make_test_payload("Loaded")).shared();
        let (queue, _) = queue(&config(), vec![a]);

        let _m = queue.enqueue(req("ABCU1234567", Priority::Medium), FetchMode::StopEarly, CancellationToken::new());
        let _l = queue.enqueue(req("ABCU7654321", Priority::Low), FetchMode::StopEarly, CancellationToken::new());
        let stats = queue.stats();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.buckets, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_groups_by_top_provider() {
        let generic = MockAdapter::new("generic").respond(make_test_payload("Loaded")).shared();
        let maersk = MockAdapter::new("maersk-direct")
            .carriers(&["maersk"])
            .respond(make_test_payload("Loaded"))
            .shared();
        let mut cfg = config();
        cfg.batch.batch_size = 3;
        let (queue, metrics) = queue(&cfg, vec![generic.clone(), maersk.clone()]);

        let tickets = vec![
            queue.enqueue(req("MAEU1234567", Priority::Low), FetchMode::StopEarly, CancellationToken::new()),
            queue.enqueue(req("ABCU1234567", Priority::Low), FetchMode::StopEarly, CancellationToken::new()),
            queue.enqueue(req("MSKU7654321", Priority::Low), FetchMode::StopEarly, CancellationToken::new()),
        ];
        for outcome in join_all(tickets).await {
            assert!(outcome.is_ok());
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.groups_dispatched, 2);
        assert_eq!(snapshot.requests_batched, 3);
        let mut routed = maersk.requested();
        routed.sort();
        assert_eq!(routed, vec!["MAEU1234567", "MSKU7654321"]);
        assert_eq!(generic.requested(), vec!["ABCU1234567"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_request_is_re_enqueued() {
        let a = MockAdapter::new("a")
            .respond(make_test_payload("Loaded"))
            .then(MockResponse::Failure(ProviderError::new(ErrorKind::NetworkError, "reset")))
            .then(MockResponse::Failure(ProviderError::new(ErrorKind::NetworkError, "reset")))
            .shared();
        let (queue, _) = queue(&config(), vec![a.clone()]);

        let ticket = queue.enqueue(req("ABCU1234567", Priority::Medium), FetchMode::StopEarly, CancellationToken::new());
        assert!(ticket.await.is_ok());
        assert_eq!(a.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let a = MockAdapter::new("a").fail(ErrorKind::NetworkError).shared();
        let mut cfg = config();
        cfg.batch.max_retries = 1;
        let (queue, _) = queue(&cfg, vec![a.clone()]);

        let ticket = queue.enqueue(req("ABCU1234567", Priority::High), FetchMode::StopEarly, CancellationToken::new());
        let err = ticket.await.unwrap_err();
        assert!(matches!(err, TrackError::AllProvidersFailed { .. }));
        assert_eq!(err.provider_failures().len(), 1);
        assert_eq!(a.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retried_request_keeps_failures_after_providers_go_down() {
        let a = MockAdapter::new("a").fail(ErrorKind::NetworkError).shared();
        let b = MockAdapter::new("b").fail(ErrorKind::AuthError).shared();
        let cfg = config();
        assert_eq!(cfg.batch.max_retries, 3);
        let (queue, _) = queue(&cfg, vec![a.clone(), b.clone()]);

        let ticket = queue.enqueue(req("ABCU1234567", Priority::High), FetchMode::CollectAll, CancellationToken::new());
        let failures = match ticket.await {
            Err(TrackError::AllProvidersFailed { failures, .. }) => failures,
            other => panic!("expected AllProvidersFailed, got {other:?}"),
        };

        let mut seen: Vec<(&str, ErrorKind)> = failures
            .iter()
            .map(|f| (f.provider_id.as_str(), f.kind))
            .collect();
        seen.sort_by_key(|(id, _)| *id);
        assert_eq!(seen, vec![("a", ErrorKind::NetworkError), ("b", ErrorKind::AuthError)]);
        // Three failed rounds mark both providers down; the last retry finds no route.
        assert_eq!(a.calls(), 3);
        assert_eq!(b.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn group_members_are_called_on_the_group_provider() {
        let a = MockAdapter::new("a").respond(make_test_payload("Loaded")).shared();
        let b = MockAdapter::new("b").respond(make_test_payload("Loaded")).shared();
        let (queue, _) = queue(&config(), vec![a.clone(), b.clone()]);

        let request = req("ABCU1234567", Priority::Low);
        let ranked = queue
            .shared
            .orchestrator
            .router()
            .select_providers(&request)
            .unwrap();
        assert_eq!(ranked[0].id, "a");

        let (tx, rx) = oneshot::channel();
        let member = QueuedRequest {
            id: Uuid::new_v4(),
            request,
            enqueued_at: Utc::now(),
            retry_count: 0,
            max_retries: 0,
            mode: FetchMode::StopEarly,
            cancel: CancellationToken::new(),
            failures: Vec::new(),
            completion: tx,
        };
        Shared::dispatch_group(&queue.shared, "b".to_string(), vec![(member, ranked)]).await;

        let results = rx.await.unwrap().unwrap();
        assert_eq!(results[0].provider_id, "b");
        assert_eq!(b.requested(), vec!["ABCU1234567"]);
        assert_eq!(a.calls(), 0);
    }

    #[test]
    fn led_by_moves_provider_to_front() {
        let ranked: Vec<RankedProvider> = ["x", "y", "z"]
            .iter()
            .enumerate()
            .map(|(i, id)| RankedProvider {
                id: (*id).to_string(),
                score: 3.0 - i as f64,
            })
            .collect();
        let ids = |list: Vec<RankedProvider>| list.into_iter().map(|r| r.id).collect::<Vec<_>>();

        assert_eq!(ids(led_by(&ranked, "z")), vec!["z", "x", "y"]);
        assert_eq!(ids(led_by(&ranked, "x")), vec!["x", "y", "z"]);
        assert_eq!(ids(led_by(&ranked, "w")), vec!["x", "y", "z"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unroutable_request_fails_without_retry() {
        let a = MockAdapter::new("a")
            .types(&[TrackingType::Booking])
            .respond(make_test_payload("Loaded"))
            .shared();
        let (queue, _) = queue(&config(), vec![a.clone()]);

        let ticket = queue.enqueue(req("ABCU1234567", Priority::High), FetchMode::StopEarly, CancellationToken::new());
        assert!(matches!(
            ticket.await,
            Err(TrackError::NoProviderAvailable { .. })
        ));
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_and_rejects_new() {
        let a = MockAdapter::new("a").respond(make_test_payload("Loaded")).shared();
        let (queue, _) = queue(&config(), vec![a.clone()]);

        let ticket = queue.enqueue(req("ABCU1234567", Priority::Low), FetchMode::StopEarly, CancellationToken::new());
        queue.shutdown().await;
        assert!(ticket.await.is_ok());

        let late = queue.enqueue(req("ABCU1234567", Priority::Low), FetchMode::StopEarly, CancellationToken::new());
        assert!(matches!(late.await, Err(TrackError::ShuttingDown)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_request_does_not_affect_siblings() {
        let a = MockAdapter::new("a")
            .delay(Duration::from_millis(500))
            .respond(make_test_payload("Loaded"))
            .shared();
        let mut cfg = config();
        cfg.batch.batch_size = 2;
        let (queue, _) = queue(&cfg, vec![a.clone()]);

        let doomed = CancellationToken::new();
        let first = queue.enqueue(req("ABCU1234567", Priority::Low), FetchMode::StopEarly, doomed.clone());
        let second = queue.enqueue(req("ABCU7654321", Priority::Low), FetchMode::StopEarly, CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(100)).await;
        doomed.cancel();
        drop(first);

        let results = second.await.unwrap();
        assert_eq!(results[0].tracking_number, "ABCU7654321");
        assert_eq!(a.cancelled_calls(), 1);
    }
}
