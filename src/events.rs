//! Push-based observer system (spec §9: "event-emitter monitoring becomes a
//! typed, push-based observer interface").
//!
//! Each subsystem emits a small, fixed set of typed events; there is no
//! dynamic, string-keyed subscription.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::circuit_breaker::CircuitState;
use crate::selector::EndpointId;

/// One of the fixed event kinds a subsystem can emit.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    BreakerOpened {
        endpoint: EndpointId,
        at: Instant,
    },
    BreakerTransition {
        endpoint: EndpointId,
        from: CircuitState,
        to: CircuitState,
    },
    CacheEvicted {
        key: [u8; 32],
        reason: EvictionReason,
    },
    CacheHit {
        key: [u8; 32],
    },
    CacheMiss {
        key: [u8; 32],
    },
    BatchDispatched {
        method: &'static str,
        size: usize,
    },
    HedgeRaced {
        method: &'static str,
        delay: Duration,
    },
    HedgeWon {
        method: &'static str,
        arm: HedgeArm,
        elapsed: Duration,
    },
    QueueEvicted {
        endpoint: EndpointId,
    },
    RateLimited {
        endpoint: Option<EndpointId>,
        retry_after: Duration,
    },
}

/// Which arm of a hedge group produced the winning result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HedgeArm {
    Primary,
    Backup(usize),
}

/// Why a bounded structure dropped an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    Ttl,
    Lru,
}

impl fmt::Display for OrchestratorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Receives [`OrchestratorEvent`]s emitted by any subsystem.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &OrchestratorEvent);
}

/// A function-based [`EventListener`], for wiring up closures without a
/// dedicated type.
pub struct FnListener<F>(F)
where
    F: Fn(&OrchestratorEvent) + Send + Sync;

impl<F> FnListener<F>
where
    F: Fn(&OrchestratorEvent) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventListener for FnListener<F>
where
    F: Fn(&OrchestratorEvent) + Send + Sync,
{
    fn on_event(&self, event: &OrchestratorEvent) {
        (self.0)(event)
    }
}

/// A collection of listeners, cheap to clone and share across subsystems.
#[derive(Clone, Default)]
pub struct EventListeners {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<L: EventListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits to every listener. A panicking listener is caught so it never
    /// takes down the orchestrator's hot path; with `tracing` enabled the
    /// panic is logged.
    pub fn emit(&self, event: &OrchestratorEvent) {
        for listener in &self.listeners {
            let result =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener.on_event(event)));
            if result.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(?event, "event listener panicked");
                #[cfg(feature = "metrics")]
                metrics::counter!("rpc_multiplexer_listener_panics_total").increment(1);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emits_to_all_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(move |_: &OrchestratorEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        listeners.emit(&OrchestratorEvent::CacheHit { key: [0; 32] });
        listeners.emit(&OrchestratorEvent::CacheHit { key: [0; 32] });
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_listener_does_not_stop_others() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(|_: &OrchestratorEvent| panic!("boom")));
        listeners.add(FnListener::new(move |_: &OrchestratorEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        listeners.emit(&OrchestratorEvent::CacheMiss { key: [0; 32] });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
