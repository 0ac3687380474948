//! The orchestrator: binds all seven subsystems behind `call`, `call_batch`,
//! and `shutdown` (spec §4.8).

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::batch::{BatchDispatcher, BatchManager};
use crate::cache::{self, RequestCache};
use crate::circuit_breaker::{CircuitState, Outcome, PROTOCOL_FAILURE_WEIGHT, TIMEOUT_FAILURE_WEIGHT};
use crate::config::{CallOptions, OrchestratorConfig};
use crate::error::CallError;
use crate::events::{EventListeners, OrchestratorEvent};
use crate::hedge::{HedgeAttempt, HedgedManager};
use crate::methods;
use crate::pool::ConnectionPool;
use crate::rate_limiter::{Admission, RateLimiter};
use crate::selector::{EndpointId, EndpointRuntime, EndpointSelector};
use crate::stats::{Stats, StatsRecorder};

/// One pending entry of the bounded admission queue (spec §4.8 "Queue
/// admission"). Holding only a completion channel keeps a waiter's own
/// memory footprint tiny and lets `cancel_all`/eviction resolve it without
/// touching the request it belongs to (I6).
struct Waiter {
    tx: oneshot::Sender<Result<(), CallError>>,
}

/// Bounded FIFO of calls waiting for an admissible endpoint, with
/// oldest-drop eviction (I5, P1). A waiter is "woken" rather than granted a
/// specific slot: it simply gets a chance to re-run endpoint selection, so
/// a spurious wake just re-queues it at the back.
struct AdmissionQueue {
    queue_max: usize,
    waiters: Mutex<VecDeque<Waiter>>,
    stats: Arc<StatsRecorder>,
    events: EventListeners,
}

impl AdmissionQueue {
    fn new(queue_max: usize, stats: Arc<StatsRecorder>, events: EventListeners) -> Self {
        Self {
            queue_max,
            waiters: Mutex::new(VecDeque::new()),
            stats,
            events,
        }
    }

    fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    async fn wait_for_capacity(&self, deadline: Instant, endpoint_hint: EndpointId) -> Result<(), CallError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.waiters.lock();
            if waiters.len() >= self.queue_max {
                if let Some(evicted) = waiters.pop_front() {
                    let _ = evicted.tx.send(Err(CallError::QueueEvicted));
                    self.stats.record_queue_eviction();
                    self.events.emit(&OrchestratorEvent::QueueEvicted { endpoint: endpoint_hint });
                }
            }
            waiters.push_back(Waiter { tx });
        }
        match tokio::time::timeout_at(deadline.into(), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CallError::Cancelled),
            Err(_) => Err(CallError::Timeout { elapsed: Duration::ZERO }),
        }
    }

    fn notify_capacity(&self) {
        if let Some(waiter) = self.waiters.lock().pop_front() {
            let _ = waiter.tx.send(Ok(()));
        }
    }

    fn cancel_all(&self) {
        let waiters: VecDeque<Waiter> = std::mem::take(&mut *self.waiters.lock());
        for waiter in waiters {
            let _ = waiter.tx.send(Err(CallError::Cancelled));
        }
    }
}

fn error_kind_label(err: &CallError) -> String {
    match err {
        CallError::RateLimited { .. } => "rate_limited".into(),
        CallError::BreakerOpen { .. } => "breaker_open".into(),
        CallError::QueueEvicted => "queue_evicted".into(),
        CallError::Timeout { .. } => "timeout".into(),
        CallError::Upstream { body_kind, .. } => format!("upstream:{body_kind}"),
        CallError::Transport { .. } => "transport".into(),
        CallError::Cancelled => "cancelled".into(),
        CallError::InvalidArgument(_) => "invalid_argument".into(),
    }
}

/// A single request inside a [`Orchestrator::call_batch`] submission.
pub struct BatchRequest {
    pub method: &'static str,
    pub params: serde_json::Value,
    pub options: CallOptions,
}

/// Binds the rate limiter, breaker-per-endpoint, cache, batch manager,
/// hedge manager, selector, and connection pool behind two entry points.
pub struct Orchestrator {
    config: OrchestratorConfig,
    endpoints: Vec<Arc<EndpointRuntime>>,
    rate_limiter: RateLimiter,
    cache: Arc<RequestCache>,
    batch: Arc<BatchManager>,
    hedge: HedgedManager,
    pool: ConnectionPool,
    admission: AdmissionQueue,
    events: EventListeners,
    stats: Arc<StatsRecorder>,
    global_inflight: AtomicU64,
    shutdown: AtomicBool,
    cache_sweeper: Mutex<Option<JoinHandle<()>>>,
    leak_guard: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, events: EventListeners) -> Result<Arc<Self>, CallError> {
        let stats = Arc::new(StatsRecorder::new());
        let rate_limiter = RateLimiter::new(config.rate_limiter.global_rps_limit, config.rate_limiter.global_burst);
        let pool = ConnectionPool::new(config.pool.clone())?;

        let mut endpoints = Vec::with_capacity(config.endpoints.len());
        for (idx, ep_config) in config.endpoints.iter().enumerate() {
            let id = EndpointId(idx as u32);
            rate_limiter.register_endpoint(id, ep_config.rps_limit, ep_config.burst);
            pool.register_endpoint(id, config.pool.max_sockets_per_host);
            endpoints.push(Arc::new(EndpointRuntime::new(id, ep_config.clone(), config.breaker.clone())));
        }

        let cache = RequestCache::new(config.cache.max_entries, events.clone(), Arc::clone(&stats));
        let cache_sweep_interval = config.cache.cleanup_interval;
        let leak_guard_interval = config.leak_guard_interval;
        let batch_config = config.batch.clone();
        let queue_max = config.queue_max;

        let orchestrator = Arc::new_cyclic(|weak: &Weak<Orchestrator>| {
            let dispatcher: BatchDispatcher = {
                let weak = weak.clone();
                Arc::new(move |batched_method: &'static str, params: serde_json::Value| {
                    let weak = weak.clone();
                    Box::pin(async move {
                        let this = weak.upgrade().ok_or(CallError::Cancelled)?;
                        let deadline = Instant::now() + this.default_timeout();
                        this.call_with_failover(batched_method, params, &CallOptions::default(), deadline, HashSet::new())
                            .await
                    })
                })
            };
            let batch = BatchManager::new(batch_config, dispatcher, events.clone(), Arc::clone(&stats));
            let hedge = HedgedManager::new(events.clone(), Arc::clone(&stats));

            Orchestrator {
                admission: AdmissionQueue::new(queue_max, Arc::clone(&stats), events.clone()),
                endpoints,
                rate_limiter,
                cache: Arc::clone(&cache),
                batch,
                hedge,
                pool,
                events,
                stats,
                global_inflight: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
                cache_sweeper: Mutex::new(None),
                leak_guard: Mutex::new(None),
                config,
            }
        });

        *orchestrator.cache_sweeper.lock() = Some(cache.spawn_sweeper(cache_sweep_interval));
        *orchestrator.leak_guard.lock() = Some(orchestrator.spawn_leak_guard(leak_guard_interval));

        Ok(orchestrator)
    }

    fn runtime(&self, id: EndpointId) -> &Arc<EndpointRuntime> {
        &self.endpoints[id.0 as usize]
    }

    fn default_timeout(&self) -> Duration {
        self.config
            .endpoints
            .first()
            .map(|e| e.timeout())
            .unwrap_or(Duration::from_secs(5))
    }

    fn call_deadline(&self, opts: &CallOptions) -> Duration {
        opts.timeout.unwrap_or_else(|| self.default_timeout())
    }

    /// Adaptive hedging uses the P95 of the endpoint that would currently be
    /// selected as primary, clamped to the configured window (spec §9's
    /// resolution of the adaptive-delay open question).
    fn hedge_delay(&self) -> Duration {
        if !self.config.hedge.adaptive {
            return self.config.hedge.delay;
        }
        let p95 = EndpointSelector::select(&self.endpoints, &HashSet::new())
            .map(|id| self.runtime(id).state.p95_ms())
            .unwrap_or(0);
        Duration::from_millis(p95).clamp(self.config.hedge.adaptive_lower, self.config.hedge.adaptive_upper)
    }

    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    pub async fn call(
        self: &Arc<Self>,
        method: &'static str,
        params: serde_json::Value,
        opts: CallOptions,
    ) -> Result<serde_json::Value, CallError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(CallError::Cancelled);
        }
        self.stats.record_call_started();

        let deadline = Instant::now() + self.call_deadline(&opts);
        let meta = methods::lookup(method);
        let ttl = opts
            .cache_ttl
            .or(meta.cache_ttl_default)
            .unwrap_or(self.config.cache.default_ttl);
        let key = cache::cache_key(method, opts.commitment, &params);

        let result = self
            .cache
            .get_or_compute(key, ttl, self.dispatch(method, params, &opts, deadline))
            .await;

        match &result {
            Ok(_) => self.stats.record_call_succeeded(),
            Err(_) => self.stats.record_call_failed(),
        }
        result
    }

    /// Splits into batchable and non-batchable work by delegating to
    /// `call()` for every member: the batch manager already coalesces
    /// concurrent batchable adds regardless of whether they originated from
    /// one `call_batch` submission or independent `call`s, so no separate
    /// grouping pass is needed here.
    pub async fn call_batch(self: &Arc<Self>, requests: Vec<BatchRequest>) -> Vec<Result<serde_json::Value, CallError>> {
        let futures = requests.into_iter().map(|r| {
            let this = Arc::clone(self);
            async move { this.call(r.method, r.params, r.options).await }
        });
        futures::future::join_all(futures).await
    }

    pub async fn shutdown(self: &Arc<Self>) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cache.mark_shutdown();
        self.admission.cancel_all();
        self.batch.flush().await;
        if let Some(handle) = self.cache_sweeper.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.leak_guard.lock().take() {
            handle.abort();
        }
        self.cache.clear();
    }

    async fn dispatch(
        self: &Arc<Self>,
        method: &'static str,
        params: serde_json::Value,
        opts: &CallOptions,
        deadline: Instant,
    ) -> Result<serde_json::Value, CallError> {
        let meta = methods::lookup(method);

        let batched_method = if opts.batchable.unwrap_or(meta.batched_method.is_some()) {
            meta.batched_method
        } else {
            None
        };
        if let Some(batched_method) = batched_method {
            return self
                .batch
                .add(
                    method,
                    batched_method,
                    opts.commitment,
                    params,
                    Some(serde_json::json!({ "commitment": opts.commitment.as_str() })),
                )
                .await;
        }

        let hedgeable = opts.hedgeable.unwrap_or(meta.hedgeable_default)
            && HedgedManager::is_hedgeable(method, &self.config.hedge.non_hedgeable, true);
        if hedgeable {
            let weak = Arc::downgrade(self);
            let opts_owned = opts.clone();
            let params_owned = params.clone();
            let attempt: HedgeAttempt = Arc::new(move |exclude: HashSet<EndpointId>| {
                let weak = weak.clone();
                let opts = opts_owned.clone();
                let params = params_owned.clone();
                Box::pin(async move {
                    let this = match weak.upgrade() {
                        Some(this) => this,
                        None => return (None, Err(CallError::Cancelled)),
                    };
                    let deadline = Instant::now() + this.call_deadline(&opts);
                    this.attempt_once(method, &params, &opts, deadline, &exclude).await
                })
            });
            return self
                .hedge
                .hedged(method, self.hedge_delay(), self.config.hedge.max_backups, attempt)
                .await;
        }

        self.call_with_failover(method, params, opts, deadline, HashSet::new()).await
    }

    async fn call_with_failover(
        self: &Arc<Self>,
        method: &'static str,
        params: serde_json::Value,
        opts: &CallOptions,
        deadline: Instant,
        mut exclude: HashSet<EndpointId>,
    ) -> Result<serde_json::Value, CallError> {
        let attempts = self.config.max_failover_attempts.max(1);
        let mut last_err: Option<CallError> = None;
        for attempt_no in 0..attempts {
            match self.attempt_once(method, &params, opts, deadline, &exclude).await {
                (_, Ok(value)) => return Ok(value),
                (Some(endpoint), Err(err)) => {
                    // Thread the previous endpoint's failure in as this
                    // one's cause, so a caller inspecting the final error
                    // can walk back through what every excluded endpoint
                    // returned rather than only seeing the last one.
                    let err = match last_err.take() {
                        Some(prev) => err.chain_cause(prev),
                        None => err,
                    };
                    if !opts.allow_failover || attempt_no + 1 >= attempts {
                        return Err(err);
                    }
                    exclude.insert(endpoint);
                    last_err = Some(err);
                }
                (None, Err(err)) => return Err(err),
            }
        }
        Err(last_err.unwrap_or(CallError::Cancelled))
    }

    async fn select_or_queue(
        self: &Arc<Self>,
        exclude: &HashSet<EndpointId>,
        deadline: Instant,
    ) -> Result<EndpointId, CallError> {
        loop {
            if exclude.len() >= self.endpoints.len() {
                return Err(CallError::Upstream {
                    endpoint: EndpointId(0),
                    status: None,
                    body_kind: "no_endpoints_available".into(),
                    cause: None,
                });
            }

            // Fast-reject (spec §2 / §4.8 step 2) when every remaining
            // candidate's breaker is closed out, regardless of whether
            // there's also inflight/global capacity to spare — otherwise
            // this falls through to `wait_for_capacity` and surfaces a
            // confusing `Timeout` instead of a prompt `BreakerOpen`.
            let breaker_admissible = self
                .endpoints
                .iter()
                .filter(|ep| !exclude.contains(&ep.id))
                .any(|ep| ep.breaker.would_admit());
            if !breaker_admissible {
                return Err(CallError::BreakerOpen {
                    endpoint: self.highest_priority_excluding(exclude),
                });
            }

            if self.has_global_capacity() {
                if let Some(id) = EndpointSelector::select(&self.endpoints, exclude) {
                    // `select()` only peeked `would_admit()`; commit the
                    // choice by consuming the probe-or-cooldown check
                    // exactly once, here, on the single endpoint a request
                    // is actually about to be dispatched to.
                    if self.runtime(id).breaker.admit() {
                        return Ok(id);
                    }
                    // Lost a race for the last half-open probe to a
                    // concurrent caller; retry selection immediately
                    // instead of queuing.
                    continue;
                }
            }
            if Instant::now() >= deadline {
                return Err(CallError::Timeout { elapsed: Duration::ZERO });
            }
            self.admission.wait_for_capacity(deadline, EndpointId(0)).await?;
        }
    }

    /// Best-effort endpoint id to attribute a `BreakerOpen` failure to, when
    /// no candidate among `exclude` admits: the one that would be preferred
    /// by priority if its breaker weren't closed out.
    fn highest_priority_excluding(&self, exclude: &HashSet<EndpointId>) -> EndpointId {
        self.endpoints
            .iter()
            .filter(|ep| !exclude.contains(&ep.id))
            .min_by_key(|ep| (ep.config.priority, ep.id.0))
            .map(|ep| ep.id)
            .unwrap_or(EndpointId(0))
    }

    /// I1: sum of per-endpoint inflight across the whole orchestrator never
    /// exceeds `global_max_inflight`, independent of any single endpoint's
    /// own `max_concurrent`.
    fn has_global_capacity(&self) -> bool {
        (self.global_inflight.load(Ordering::Relaxed) as usize) < self.config.global_max_inflight
    }

    /// One endpoint-selection, rate-limit, and execution round; never
    /// retried internally (retries are [`call_with_failover`]'s job).
    async fn attempt_once(
        self: &Arc<Self>,
        method: &'static str,
        params: &serde_json::Value,
        opts: &CallOptions,
        deadline: Instant,
        exclude: &HashSet<EndpointId>,
    ) -> (Option<EndpointId>, Result<serde_json::Value, CallError>) {
        let endpoint_id = match self.select_or_queue(exclude, deadline).await {
            Ok(id) => id,
            Err(err) => return (None, Err(err)),
        };
        let ep = Arc::clone(self.runtime(endpoint_id));
        ep.state.acquire_inflight();
        self.global_inflight.fetch_add(1, Ordering::AcqRel);
        self.stats.set_endpoint_inflight(endpoint_id, ep.state.inflight() as u64);

        let admission_result = if opts.wait_for_ratelimit {
            self.rate_limiter.consume(endpoint_id, 1.0, deadline).await.map_err(|_| CallError::RateLimited {
                endpoint: Some(endpoint_id),
                retry_after: Duration::ZERO,
            })
        } else {
            match self.rate_limiter.try_consume(endpoint_id, 1.0) {
                Ok(Admission::Ok) => Ok(()),
                Ok(Admission::Retry(wait)) => Err(CallError::RateLimited {
                    endpoint: Some(endpoint_id),
                    retry_after: wait,
                }),
                Err(message) => Err(CallError::InvalidArgument(message)),
            }
        };

        if let Err(err) = admission_result {
            ep.state.release_inflight();
            self.global_inflight.fetch_sub(1, Ordering::AcqRel);
            self.admission.notify_capacity();
            self.stats.record_rate_limited();
            self.events.emit(&OrchestratorEvent::RateLimited {
                endpoint: Some(endpoint_id),
                retry_after: err.retry_hint().unwrap_or_default(),
            });
            return (Some(endpoint_id), Err(err));
        }

        let started = Instant::now();
        let remaining = deadline.saturating_duration_since(Instant::now()).min(ep.config.timeout());
        let result = self
            .pool
            .execute(endpoint_id, &ep.config.url, ep.config.auth.as_deref(), method, params.clone(), remaining)
            .await;
        let elapsed_ms = started.elapsed().as_millis().min(u32::MAX as u128) as u32;
        let load_ratio = ep.state.load_ratio(ep.config.max_concurrent);

        // Rate-limit errors never reach the breaker (spec §4.2); every other
        // outcome updates it, weighted by failure kind.
        let error_kind = match &result {
            Ok(_) => {
                if let Some((from, to)) = ep.breaker.on_result(Outcome::Success, load_ratio) {
                    self.on_breaker_transition(endpoint_id, from, to);
                }
                None
            }
            Err(CallError::RateLimited { .. }) => {
                self.stats.record_rate_limited();
                Some("rate_limited".to_string())
            }
            Err(CallError::Timeout { .. }) => {
                if let Some((from, to)) = ep
                    .breaker
                    .on_result(Outcome::Failure { weight: TIMEOUT_FAILURE_WEIGHT }, load_ratio)
                {
                    self.on_breaker_transition(endpoint_id, from, to);
                }
                Some("timeout".to_string())
            }
            Err(other) => {
                if let Some((from, to)) = ep
                    .breaker
                    .on_result(Outcome::Failure { weight: PROTOCOL_FAILURE_WEIGHT }, load_ratio)
                {
                    self.on_breaker_transition(endpoint_id, from, to);
                }
                Some(error_kind_label(other))
            }
        };

        EndpointSelector::release(&ep, elapsed_ms, error_kind.as_deref());
        self.global_inflight.fetch_sub(1, Ordering::AcqRel);
        self.stats.set_endpoint_p95_ms(endpoint_id, ep.state.p95_ms());
        self.stats.set_endpoint_inflight(endpoint_id, ep.state.inflight() as u64);
        self.admission.notify_capacity();

        (Some(endpoint_id), result)
    }

    fn on_breaker_transition(&self, endpoint: EndpointId, from: CircuitState, to: CircuitState) {
        self.events.emit(&OrchestratorEvent::BreakerTransition { endpoint, from, to });
        #[cfg(feature = "tracing")]
        tracing::debug!(?endpoint, ?from, ?to, "breaker transition");
        if to == CircuitState::Open {
            self.stats.record_breaker_opened();
            self.events.emit(&OrchestratorEvent::BreakerOpened { endpoint, at: Instant::now() });
        }
    }

    fn spawn_leak_guard(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if this.shutdown.load(Ordering::Relaxed) {
                    return;
                }
                this.leak_guard_sweep();
            }
        })
    }

    /// Latency rings and error-kind maps already self-cap on every write
    /// (I5); this pass just refreshes the exported gauges so a caller
    /// polling `stats()` between requests still sees current numbers.
    fn leak_guard_sweep(&self) {
        for ep in &self.endpoints {
            self.stats.set_endpoint_inflight(ep.id, ep.state.inflight() as u64);
            self.stats.set_endpoint_p95_ms(ep.id, ep.state.p95_ms());
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(queue_len = self.admission.len(), "leak guard sweep");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rpc_response(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": result,
        }))
    }

    async fn single_endpoint_orchestrator(server: &MockServer) -> Arc<Orchestrator> {
        let config = OrchestratorConfig::builder()
            .endpoint(EndpointConfig::builder(server.uri()).max_concurrent(8).build())
            .build()
            .unwrap();
        Orchestrator::new(config, EventListeners::new()).unwrap()
    }

    #[tokio::test]
    async fn call_returns_the_upstream_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/")).respond_with(rpc_response(serde_json::json!(42))).mount(&server).await;

        let orchestrator = single_endpoint_orchestrator(&server).await;
        let result = orchestrator.call("getSlot", serde_json::json!([]), CallOptions::default()).await.unwrap();
        assert_eq!(result, serde_json::json!(42));
    }

    #[tokio::test]
    async fn concurrent_identical_calls_hit_the_upstream_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/")).respond_with(rpc_response(serde_json::json!(7))).mount(&server).await;

        let orchestrator = single_endpoint_orchestrator(&server).await;
        let opts = CallOptions::builder().cache_ttl(Duration::from_secs(1)).build();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let o = Arc::clone(&orchestrator);
            let opts = opts.clone();
            handles.push(tokio::spawn(async move { o.call("getSlot", serde_json::json!([]), opts).await }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), serde_json::json!(7));
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn breaker_isolation_routes_around_a_failing_endpoint() {
        let failing = MockServer::start().await;
        let healthy = MockServer::start().await;
        Mock::given(method("POST")).and(path("/")).respond_with(ResponseTemplate::new(500)).mount(&failing).await;
        Mock::given(method("POST")).and(path("/")).respond_with(rpc_response(serde_json::json!("ok"))).mount(&healthy).await;

        let config = OrchestratorConfig::builder()
            .endpoint(EndpointConfig::builder(failing.uri()).priority(0).max_concurrent(8).build())
            .endpoint(EndpointConfig::builder(healthy.uri()).priority(1).max_concurrent(8).build())
            .breaker(crate::config::CircuitBreakerConfig {
                failure_threshold: 3,
                ..crate::config::CircuitBreakerConfig::default()
            })
            .build()
            .unwrap();
        let orchestrator = Orchestrator::new(config, EventListeners::new()).unwrap();

        for _ in 0..5 {
            let opts = CallOptions::builder().allow_failover(false).build();
            let _ = orchestrator.call("getSlot", serde_json::json!([]), opts).await;
        }
        assert_eq!(orchestrator.runtime(EndpointId(0)).breaker.state(), CircuitState::Open);

        let result = orchestrator
            .call("getSlot", serde_json::json!([]), CallOptions::builder().allow_failover(true).build())
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!("ok"));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_rejects_new_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/")).respond_with(rpc_response(serde_json::json!(1))).mount(&server).await;
        let orchestrator = single_endpoint_orchestrator(&server).await;

        orchestrator.shutdown().await;
        orchestrator.shutdown().await;

        let err = orchestrator.call("getSlot", serde_json::json!([]), CallOptions::default()).await.unwrap_err();
        assert!(matches!(err, CallError::Cancelled));
    }

    #[tokio::test]
    async fn call_batch_preserves_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(rpc_response(serde_json::json!([
                { "lamports": 1, "owner": "x" },
                { "lamports": 2, "owner": "x" },
                { "lamports": 3, "owner": "x" }
            ])))
            .mount(&server)
            .await;

        let orchestrator = single_endpoint_orchestrator(&server).await;
        let requests = vec![
            BatchRequest { method: "getBalance", params: serde_json::json!("a1"), options: CallOptions::default() },
            BatchRequest { method: "getBalance", params: serde_json::json!("a2"), options: CallOptions::default() },
            BatchRequest { method: "getBalance", params: serde_json::json!("a3"), options: CallOptions::default() },
        ];
        let results = orchestrator.call_batch(requests).await;
        assert_eq!(results[0].as_ref().unwrap(), &serde_json::json!(1));
        assert_eq!(results[1].as_ref().unwrap(), &serde_json::json!(2));
        assert_eq!(results[2].as_ref().unwrap(), &serde_json::json!(3));
    }
}
