//! Token-bucket rate limiter (spec §4.1).
//!
//! Continuous-refill token bucket per endpoint plus one global bucket,
//! each guarded by its own lock rather than a single shared one — a global
//! bottleneck would violate the "global state must never dominate a
//! critical section" rule in spec §5.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::selector::EndpointId;

/// Outcome of a non-blocking acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Ok,
    Retry(Duration),
}

/// A single continuous-refill bucket.
struct TokenBucketState {
    tokens: f64,
    rate: f64,
    burst: f64,
    last_refill: Instant,
}

impl TokenBucketState {
    fn new(rate: f64, burst: f64) -> Self {
        Self {
            tokens: burst,
            rate,
            burst,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        // Clock jumps backward (spec §4.1 edge cases): clamp to zero elapsed.
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        self.last_refill = now;
    }

    /// Non-blocking attempt. `n > burst` is rejected by the caller before
    /// reaching here (spec: "accepted iff n <= burst; else InvalidArgument").
    fn try_consume(&mut self, n: f64) -> Admission {
        let now = Instant::now();
        self.refill(now);
        if self.tokens >= n {
            self.tokens -= n;
            Admission::Ok
        } else {
            let deficit = n - self.tokens;
            let wait = Duration::from_secs_f64((deficit / self.rate).max(0.0));
            Admission::Retry(wait)
        }
    }

    /// Refunds `n` tokens, capped at `burst` (spec §4.1: "on global failure,
    /// the endpoint tokens are returned").
    fn refund(&mut self, n: f64) {
        self.tokens = (self.tokens + n).min(self.burst);
    }
}

/// Per-endpoint plus global token-bucket rate limiter.
pub struct RateLimiter {
    endpoints: Mutex<HashMap<EndpointId, TokenBucketState>>,
    global: Mutex<TokenBucketState>,
}

impl RateLimiter {
    pub fn new(global_rate: f64, global_burst: f64) -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
            global: Mutex::new(TokenBucketState::new(global_rate, global_burst)),
        }
    }

    pub fn register_endpoint(&self, id: EndpointId, rate: f64, burst: f64) {
        self.endpoints
            .lock()
            .insert(id, TokenBucketState::new(rate, burst));
    }

    /// Non-blocking acquisition. Consumes the endpoint bucket first, then
    /// the global bucket; a global denial refunds the endpoint tokens
    /// (spec §4.1).
    pub fn try_consume(&self, endpoint: EndpointId, n: f64) -> Result<Admission, String> {
        let endpoint_burst = {
            let mut endpoints = self.endpoints.lock();
            let bucket = endpoints
                .get_mut(&endpoint)
                .ok_or_else(|| format!("unknown endpoint {endpoint:?}"))?;
            if n > bucket.burst {
                return Err(format!("n={n} exceeds burst={}", bucket.burst));
            }
            bucket.burst
        };
        let _ = endpoint_burst;

        let endpoint_admission = {
            let mut endpoints = self.endpoints.lock();
            let bucket = endpoints.get_mut(&endpoint).unwrap();
            bucket.try_consume(n)
        };

        match endpoint_admission {
            Admission::Retry(wait) => Ok(Admission::Retry(wait)),
            Admission::Ok => {
                let global_admission = {
                    let mut global = self.global.lock();
                    global.try_consume(n)
                };
                match global_admission {
                    Admission::Ok => Ok(Admission::Ok),
                    Admission::Retry(wait) => {
                        // Global denied: refund the endpoint-level tokens.
                        let mut endpoints = self.endpoints.lock();
                        endpoints.get_mut(&endpoint).unwrap().refund(n);
                        Ok(Admission::Retry(wait))
                    }
                }
            }
        }
    }

    /// Suspends until tokens are available or `deadline` expires.
    pub async fn consume(
        &self,
        endpoint: EndpointId,
        n: f64,
        deadline: Instant,
    ) -> Result<(), String> {
        loop {
            match self.try_consume(endpoint, n)? {
                Admission::Ok => return Ok(()),
                Admission::Retry(wait) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err("rate limit deadline exceeded".into());
                    }
                    let capped = wait.min(deadline.saturating_duration_since(now));
                    tokio::time::sleep(capped).await;
                    if Instant::now() >= deadline {
                        return Err("rate limit deadline exceeded".into());
                    }
                }
            }
        }
    }
}
