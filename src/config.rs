//! Configuration surface (spec §6's "complete recognized option set"),
//! assembled through the teacher's per-subsystem builder pattern
//! (`XConfig::builder()...build()`) and a top-level
//! [`OrchestratorConfigBuilder`] that wires them together.
//!
//! Loading any of this from disk or environment variables is explicitly out
//! of scope (spec §1); callers hand in already-parsed Rust values.

use std::time::Duration;

/// Upstream consistency level. Participates in cache and batch keys (spec
/// glossary: "Commitment").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl Default for Commitment {
    fn default() -> Self {
        Commitment::Confirmed
    }
}

/// Immutable, per-endpoint configuration fixed at construction.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub url: String,
    pub priority: u32,
    pub weight: u32,
    pub rps_limit: f64,
    pub burst: f64,
    pub max_concurrent: usize,
    pub timeout_ms: u64,
    pub auth: Option<String>,
}

impl EndpointConfig {
    pub fn builder(url: impl Into<String>) -> EndpointConfigBuilder {
        EndpointConfigBuilder::new(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

pub struct EndpointConfigBuilder {
    url: String,
    priority: u32,
    weight: u32,
    rps_limit: f64,
    burst: f64,
    max_concurrent: usize,
    timeout_ms: u64,
    auth: Option<String>,
}

impl EndpointConfigBuilder {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            priority: 0,
            weight: 1,
            rps_limit: 10.0,
            burst: 14.0,
            max_concurrent: 16,
            timeout_ms: 2_000,
            auth: None,
        }
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn rps_limit(mut self, rps: f64) -> Self {
        self.rps_limit = rps;
        self
    }

    pub fn burst(mut self, burst: f64) -> Self {
        self.burst = burst;
        self
    }

    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn auth(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(token.into());
        self
    }

    pub fn build(self) -> EndpointConfig {
        EndpointConfig {
            url: self.url,
            priority: self.priority,
            weight: self.weight,
            rps_limit: self.rps_limit,
            burst: self.burst,
            max_concurrent: self.max_concurrent,
            timeout_ms: self.timeout_ms,
            auth: self.auth,
        }
    }
}

/// Rate limiter knobs (spec §4.1 / §6).
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub global_rps_limit: f64,
    pub global_burst: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            global_rps_limit: 40.0,
            global_burst: 56.0,
        }
    }
}

/// Breaker knobs (spec §4.2 / §6).
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub half_open_probes: u32,
    pub half_open_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            half_open_probes: 3,
            half_open_successes: 2,
        }
    }
}

/// Cache knobs (spec §4.3 / §6).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 4_096,
            default_ttl: Duration::from_millis(1_000),
            cleanup_interval: Duration::from_secs(5),
        }
    }
}

/// Batch knobs (spec §4.4 / §6).
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub enabled: bool,
    pub window: Duration,
    pub max_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_millis(50),
            max_size: 100,
        }
    }
}

/// Hedge knobs (spec §4.5 / §6).
#[derive(Debug, Clone)]
pub struct HedgeConfig {
    pub delay: Duration,
    pub max_backups: usize,
    pub adaptive: bool,
    pub adaptive_lower: Duration,
    pub adaptive_upper: Duration,
    pub non_hedgeable: Vec<&'static str>,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(200),
            max_backups: 1,
            adaptive: false,
            adaptive_lower: Duration::from_millis(50),
            adaptive_upper: Duration::from_millis(1_000),
            non_hedgeable: Vec::new(),
        }
    }
}

/// Connection pool knobs (spec §4.7 / §6).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_sockets_per_host: usize,
    pub max_sockets_global: usize,
    pub keep_alive: Duration,
    pub idle_cleanup_interval: Duration,
    pub max_response_bytes: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sockets_per_host: 32,
            max_sockets_global: 128,
            keep_alive: Duration::from_secs(90),
            idle_cleanup_interval: Duration::from_secs(30),
            max_response_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Top-level configuration assembled by [`OrchestratorConfigBuilder`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub endpoints: Vec<EndpointConfig>,
    pub rate_limiter: RateLimiterConfig,
    pub breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub hedge: HedgeConfig,
    pub pool: PoolConfig,
    pub global_max_inflight: usize,
    pub queue_max: usize,
    pub leak_guard_interval: Duration,
    pub max_failover_attempts: usize,
}

impl OrchestratorConfig {
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::new()
    }
}

pub struct OrchestratorConfigBuilder {
    endpoints: Vec<EndpointConfig>,
    rate_limiter: RateLimiterConfig,
    breaker: CircuitBreakerConfig,
    cache: CacheConfig,
    batch: BatchConfig,
    hedge: HedgeConfig,
    pool: PoolConfig,
    global_max_inflight: usize,
    queue_max: usize,
    leak_guard_interval: Duration,
    max_failover_attempts: usize,
}

impl OrchestratorConfigBuilder {
    fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            rate_limiter: RateLimiterConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
            hedge: HedgeConfig::default(),
            pool: PoolConfig::default(),
            global_max_inflight: 256,
            queue_max: 500,
            leak_guard_interval: Duration::from_secs(60),
            max_failover_attempts: 2,
        }
    }

    pub fn endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn rate_limiter(mut self, config: RateLimiterConfig) -> Self {
        self.rate_limiter = config;
        self
    }

    pub fn breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn batch(mut self, config: BatchConfig) -> Self {
        self.batch = config;
        self
    }

    pub fn hedge(mut self, config: HedgeConfig) -> Self {
        self.hedge = config;
        self
    }

    pub fn pool(mut self, config: PoolConfig) -> Self {
        self.pool = config;
        self
    }

    pub fn global_max_inflight(mut self, max: usize) -> Self {
        self.global_max_inflight = max;
        self
    }

    pub fn queue_max(mut self, max: usize) -> Self {
        self.queue_max = max;
        self
    }

    pub fn leak_guard_interval(mut self, interval: Duration) -> Self {
        self.leak_guard_interval = interval;
        self
    }

    pub fn max_failover_attempts(mut self, attempts: usize) -> Self {
        self.max_failover_attempts = attempts;
        self
    }

    /// Validates and builds the configuration. Mirrors the teacher's
    /// validating builders (e.g. circuit breaker threshold checks).
    pub fn build(self) -> Result<OrchestratorConfig, String> {
        if self.endpoints.is_empty() {
            return Err("at least one endpoint is required".into());
        }
        if self.queue_max == 0 {
            return Err("queue_max must be > 0".into());
        }
        Ok(OrchestratorConfig {
            endpoints: self.endpoints,
            rate_limiter: self.rate_limiter,
            breaker: self.breaker,
            cache: self.cache,
            batch: self.batch,
            hedge: self.hedge,
            pool: self.pool,
            global_max_inflight: self.global_max_inflight,
            queue_max: self.queue_max,
            leak_guard_interval: self.leak_guard_interval,
            max_failover_attempts: self.max_failover_attempts,
        })
    }
}

/// Per-call options (spec §4.8: `options ⊆ { commitment, timeout, priority,
/// hedgeable?, batchable?, cache_ttl?, allow_failover?, wait_for_ratelimit? }`).
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub commitment: Commitment,
    pub timeout: Option<Duration>,
    pub priority: u32,
    pub hedgeable: Option<bool>,
    pub batchable: Option<bool>,
    pub cache_ttl: Option<Duration>,
    pub allow_failover: bool,
    pub wait_for_ratelimit: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            commitment: Commitment::default(),
            timeout: None,
            priority: 0,
            hedgeable: None,
            batchable: None,
            cache_ttl: None,
            allow_failover: true,
            wait_for_ratelimit: false,
        }
    }
}

impl CallOptions {
    pub fn builder() -> CallOptionsBuilder {
        CallOptionsBuilder::default()
    }
}

#[derive(Default)]
pub struct CallOptionsBuilder {
    opts: CallOptionsPartial,
}

#[derive(Default)]
struct CallOptionsPartial {
    commitment: Option<Commitment>,
    timeout: Option<Duration>,
    priority: Option<u32>,
    hedgeable: Option<bool>,
    batchable: Option<bool>,
    cache_ttl: Option<Duration>,
    allow_failover: Option<bool>,
    wait_for_ratelimit: Option<bool>,
}

impl CallOptionsBuilder {
    pub fn commitment(mut self, commitment: Commitment) -> Self {
        self.opts.commitment = Some(commitment);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = Some(timeout);
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.opts.priority = Some(priority);
        self
    }

    pub fn hedgeable(mut self, hedgeable: bool) -> Self {
        self.opts.hedgeable = Some(hedgeable);
        self
    }

    pub fn batchable(mut self, batchable: bool) -> Self {
        self.opts.batchable = Some(batchable);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.opts.cache_ttl = Some(ttl);
        self
    }

    pub fn allow_failover(mut self, allow: bool) -> Self {
        self.opts.allow_failover = Some(allow);
        self
    }

    pub fn wait_for_ratelimit(mut self, wait: bool) -> Self {
        self.opts.wait_for_ratelimit = Some(wait);
        self
    }

    pub fn build(self) -> CallOptions {
        let defaults = CallOptions::default();
        CallOptions {
            commitment: self.opts.commitment.unwrap_or(defaults.commitment),
            timeout: self.opts.timeout.or(defaults.timeout),
            priority: self.opts.priority.unwrap_or(defaults.priority),
            hedgeable: self.opts.hedgeable,
            batchable: self.opts.batchable,
            cache_ttl: self.opts.cache_ttl,
            allow_failover: self.opts.allow_failover.unwrap_or(defaults.allow_failover),
            wait_for_ratelimit: self
                .opts
                .wait_for_ratelimit
                .unwrap_or(defaults.wait_for_ratelimit),
        }
    }
}
