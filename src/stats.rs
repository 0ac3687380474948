//! In-memory counters/gauges for the stats accessor named in spec §6.
//!
//! Export is explicitly out of scope (spec §1); this is the passive,
//! in-process snapshot plus, under the `metrics` feature, real emission
//! through the `metrics` facade so an external recorder can scrape it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::selector::EndpointId;

/// Point-in-time snapshot of the counters spec.md §6 names.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub calls_total: u64,
    pub calls_succeeded: u64,
    pub calls_failed: u64,
    pub rate_limited_total: u64,
    pub breaker_opens_total: u64,
    pub queue_evictions_total: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced_requests: u64,
    pub batches_sent: u64,
    pub requests_batched: u64,
    pub hedge_wins_primary: u64,
    pub hedge_wins_backup: u64,
    pub endpoint_inflight: HashMap<EndpointId, u64>,
    pub endpoint_p95_ms: HashMap<EndpointId, u64>,
}

/// Live counters mutated on the hot path; cheap to clone (it's an `Arc` of
/// atomics under the hood via `Stats::snapshot`, not cloned per request).
#[derive(Default)]
pub struct StatsRecorder {
    calls_total: AtomicU64,
    calls_succeeded: AtomicU64,
    calls_failed: AtomicU64,
    rate_limited_total: AtomicU64,
    breaker_opens_total: AtomicU64,
    queue_evictions_total: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced_requests: AtomicU64,
    batches_sent: AtomicU64,
    requests_batched: AtomicU64,
    hedge_wins_primary: AtomicU64,
    hedge_wins_backup: AtomicU64,
    endpoint_inflight: Mutex<HashMap<EndpointId, u64>>,
    endpoint_p95_ms: Mutex<HashMap<EndpointId, u64>>,
}

macro_rules! inc {
    ($self:ident, $field:ident) => {
        $self.$field.fetch_add(1, Ordering::Relaxed);
    };
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call_started(&self) {
        inc!(self, calls_total);
        #[cfg(feature = "metrics")]
        metrics::counter!("rpc_multiplexer_calls_total").increment(1);
    }

    pub fn record_call_succeeded(&self) {
        inc!(self, calls_succeeded);
        #[cfg(feature = "metrics")]
        metrics::counter!("rpc_multiplexer_calls_succeeded_total").increment(1);
    }

    pub fn record_call_failed(&self) {
        inc!(self, calls_failed);
        #[cfg(feature = "metrics")]
        metrics::counter!("rpc_multiplexer_calls_failed_total").increment(1);
    }

    pub fn record_rate_limited(&self) {
        inc!(self, rate_limited_total);
        #[cfg(feature = "metrics")]
        metrics::counter!("rpc_multiplexer_rate_limited_total").increment(1);
    }

    pub fn record_breaker_opened(&self) {
        inc!(self, breaker_opens_total);
        #[cfg(feature = "metrics")]
        metrics::counter!("rpc_multiplexer_breaker_opens_total").increment(1);
    }

    pub fn record_queue_eviction(&self) {
        inc!(self, queue_evictions_total);
        #[cfg(feature = "metrics")]
        metrics::counter!("rpc_multiplexer_queue_evictions_total").increment(1);
    }

    pub fn record_cache_hit(&self) {
        inc!(self, cache_hits);
        #[cfg(feature = "metrics")]
        metrics::counter!("rpc_multiplexer_cache_hits_total").increment(1);
    }

    pub fn record_cache_miss(&self) {
        inc!(self, cache_misses);
        #[cfg(feature = "metrics")]
        metrics::counter!("rpc_multiplexer_cache_misses_total").increment(1);
    }

    pub fn record_coalesced(&self) {
        inc!(self, coalesced_requests);
        #[cfg(feature = "metrics")]
        metrics::counter!("rpc_multiplexer_coalesced_requests_total").increment(1);
    }

    pub fn record_batch_sent(&self, size: u64) {
        inc!(self, batches_sent);
        self.requests_batched.fetch_add(size, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        {
            metrics::counter!("rpc_multiplexer_batches_sent_total").increment(1);
            metrics::counter!("rpc_multiplexer_requests_batched_total").increment(size);
        }
    }

    pub fn record_hedge_win_primary(&self) {
        inc!(self, hedge_wins_primary);
        #[cfg(feature = "metrics")]
        metrics::counter!("rpc_multiplexer_hedge_wins_primary_total").increment(1);
    }

    pub fn record_hedge_win_backup(&self) {
        inc!(self, hedge_wins_backup);
        #[cfg(feature = "metrics")]
        metrics::counter!("rpc_multiplexer_hedge_wins_backup_total").increment(1);
    }

    pub fn set_endpoint_inflight(&self, endpoint: EndpointId, value: u64) {
        self.endpoint_inflight.lock().unwrap().insert(endpoint, value);
        #[cfg(feature = "metrics")]
        metrics::gauge!("rpc_multiplexer_endpoint_inflight", "endpoint" => endpoint.to_string())
            .set(value as f64);
    }

    pub fn set_endpoint_p95_ms(&self, endpoint: EndpointId, value: u64) {
        self.endpoint_p95_ms.lock().unwrap().insert(endpoint, value);
        #[cfg(feature = "metrics")]
        metrics::gauge!("rpc_multiplexer_endpoint_p95_ms", "endpoint" => endpoint.to_string())
            .set(value as f64);
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            calls_total: self.calls_total.load(Ordering::Relaxed),
            calls_succeeded: self.calls_succeeded.load(Ordering::Relaxed),
            calls_failed: self.calls_failed.load(Ordering::Relaxed),
            rate_limited_total: self.rate_limited_total.load(Ordering::Relaxed),
            breaker_opens_total: self.breaker_opens_total.load(Ordering::Relaxed),
            queue_evictions_total: self.queue_evictions_total.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            requests_batched: self.requests_batched.load(Ordering::Relaxed),
            hedge_wins_primary: self.hedge_wins_primary.load(Ordering::Relaxed),
            hedge_wins_backup: self.hedge_wins_backup.load(Ordering::Relaxed),
            endpoint_inflight: self.endpoint_inflight.lock().unwrap().clone(),
            endpoint_p95_ms: self.endpoint_p95_ms.lock().unwrap().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counters() {
        let recorder = StatsRecorder::new();
        recorder.record_call_started();
        recorder.record_call_succeeded();
        recorder.record_cache_hit();
        recorder.record_batch_sent(4);
        let snap = recorder.snapshot();
        assert_eq!(snap.calls_total, 1);
        assert_eq!(snap.calls_succeeded, 1);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.batches_sent, 1);
        assert_eq!(snap.requests_batched, 4);
    }
}
