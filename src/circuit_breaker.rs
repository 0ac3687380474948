//! Per-endpoint circuit breaker (spec §4.2).
//!
//! Cross-endpoint state never couples (I4): every `Breaker` only ever reads
//! its own sample history plus the live load ratio of the endpoint it
//! belongs to.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// The outcome of a completed call, as seen by the breaker. Rate-limit
/// denials never reach here (spec §4.2: "do not count toward the
/// breaker... signaled back to §4.1 as refill-failure only").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure { weight: u32 },
}

/// Failure weight for a timeout, higher than a generic protocol error
/// (spec §4.2: "Timeout errors are weighted higher than protocol errors").
pub const TIMEOUT_FAILURE_WEIGHT: u32 = 2;
pub const PROTOCOL_FAILURE_WEIGHT: u32 = 1;

struct Inner {
    state: CircuitState,
    opened_at: Option<Instant>,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_attempts: u32,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            opened_at: None,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_attempts: 0,
        }
    }
}

/// One breaker instance, owned by a single endpoint's runtime state.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// True iff Closed, or Open past its cooldown (which self-transitions
    /// to HalfOpen and admits the probe), or HalfOpen with probes left.
    pub fn admit(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if inner.opened_at.map(|at| at.elapsed()) >= Some(self.config.cooldown) {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_attempts = 0;
                    inner.half_open_successes = 0;
                    inner.half_open_attempts += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_attempts < self.config.half_open_probes {
                    inner.half_open_attempts += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        !matches!(self.inner.lock().state, CircuitState::Open)
    }

    /// Non-mutating read of whether this endpoint is currently admissible:
    /// Closed, Open past its cooldown, or HalfOpen with probes remaining.
    /// Unlike `admit()`, this never consumes a half-open probe nor flips
    /// Open into HalfOpen; it's for ranking/peeking candidates (selection,
    /// adaptive-hedge P95 lookups) without spending probe budget on
    /// endpoints that end up not receiving the request.
    pub fn would_admit(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => inner.opened_at.map(|at| at.elapsed()) >= Some(self.config.cooldown),
            CircuitState::HalfOpen => inner.half_open_attempts < self.config.half_open_probes,
        }
    }

    /// Advances the state machine. `load_ratio` is `endpoint_inflight /
    /// endpoint_max_concurrent`, read fresh at evaluation time (spec §4.2).
    pub fn on_result(&self, outcome: Outcome, load_ratio: f64) -> Option<(CircuitState, CircuitState)> {
        let mut inner = self.inner.lock();
        let from = inner.state;
        match (inner.state, outcome) {
            (CircuitState::HalfOpen, Outcome::Success) => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_successes {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                }
            }
            (CircuitState::HalfOpen, Outcome::Failure { .. }) => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            (CircuitState::Closed, Outcome::Success) => {
                inner.consecutive_failures = 0;
            }
            (CircuitState::Closed, Outcome::Failure { weight }) => {
                inner.consecutive_failures += weight;
                let threshold = (self.config.failure_threshold as f64
                    * (1.0 + 0.5 * load_ratio.clamp(0.0, 1.0)))
                .ceil() as u32;
                if inner.consecutive_failures >= threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            (CircuitState::Open, _) => {
                // Outcomes can't legitimately arrive while Open (admit()
                // gates entry); ignore defensively rather than panic.
            }
        }
        let to = inner.state;
        if from != to {
            Some((from, to))
        } else {
            None
        }
    }

    /// Forces a transition regardless of history, for tests and ops.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
    }

    pub fn cooldown(&self) -> Duration {
        self.config.cooldown
    }
}
