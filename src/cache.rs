//! Request cache with TTL, LRU eviction, and in-flight coalescing
//! (spec §4.3).
//!
//! Coalescing is a leader/follower broadcast, the same shape
//! `tower-resilience`'s coalesce service uses for its in-flight map: the
//! first caller for a key becomes the leader and drives `compute`; every
//! other caller subscribes to the leader's single-shot broadcast.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::Commitment;
use crate::error::CallError;
use crate::events::{EventListeners, EvictionReason, OrchestratorEvent};
use crate::stats::StatsRecorder;

/// Cache keys are bounded to 32 bytes (spec §4.3).
pub type CacheKey = [u8; 32];

/// Deterministic key over method, commitment, and canonicalized params
/// (stable object-key ordering, lowercased address-shaped strings).
pub fn cache_key(method: &str, commitment: Commitment, params: &serde_json::Value) -> CacheKey {
    let canonical = canonicalize(params);
    let payload = format!("{method}|{}|{canonical}", commitment.as_str());
    fnv1a_256(payload.as_bytes())
}

fn canonicalize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", k, canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        serde_json::Value::String(s) => s.to_lowercase(),
        other => other.to_string(),
    }
}

/// Small, non-cryptographic 256-bit hash (two interleaved FNV-1a-64 passes
/// with different seeds) sized to the 32-byte cache key bound; collision
/// resistance requirements here are "avoid accidental collisions among a
/// few thousand live keys", not adversarial.
fn fnv1a_256(bytes: &[u8]) -> [u8; 32] {
    const SEEDS: [u64; 4] = [
        0xcbf29ce484222325,
        0x9e3779b97f4a7c15,
        0x100000001b3,
        0xff51afd7ed558ccd,
    ];
    let mut out = [0u8; 32];
    for (lane, seed) in SEEDS.iter().enumerate() {
        let mut hash = *seed;
        for &b in bytes {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        out[lane * 8..lane * 8 + 8].copy_from_slice(&hash.to_le_bytes());
    }
    out
}

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

type Waiter = broadcast::Sender<Result<serde_json::Value, CallError>>;

/// LRU store plus TTL plus in-flight coalescing registry.
pub struct RequestCache {
    store: Mutex<LruCache<CacheKey, CacheEntry>>,
    in_flight: Mutex<HashMap<CacheKey, Waiter>>,
    events: EventListeners,
    stats: Arc<StatsRecorder>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    sweeps: AtomicU64,
}

impl RequestCache {
    pub fn new(max_entries: usize, events: EventListeners, stats: Arc<StatsRecorder>) -> Arc<Self> {
        let cap = std::num::NonZeroUsize::new(max_entries.max(1)).unwrap();
        Arc::new(Self {
            store: Mutex::new(LruCache::new(cap)),
            in_flight: Mutex::new(HashMap::new()),
            events,
            stats,
            shutdown: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            sweeps: AtomicU64::new(0),
        })
    }

    /// O(1) hit check; updates LRU recency via `LruCache::get`.
    pub fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let mut store = self.store.lock();
        let now = Instant::now();
        let hit = match store.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                store.pop(key);
                self.events.emit(&OrchestratorEvent::CacheEvicted {
                    key: *key,
                    reason: EvictionReason::Ttl,
                });
                None
            }
            None => None,
        };
        if hit.is_some() {
            self.stats.record_cache_hit();
            self.events.emit(&OrchestratorEvent::CacheHit { key: *key });
        } else {
            self.stats.record_cache_miss();
            self.events.emit(&OrchestratorEvent::CacheMiss { key: *key });
        }
        hit
    }

    /// On miss, attaches to an in-flight computation for `key` or starts
    /// one. Every waiter observes the same resolved value or error (I3,
    /// L1).
    pub async fn get_or_compute<F>(
        &self,
        key: CacheKey,
        ttl: Duration,
        compute: F,
    ) -> Result<serde_json::Value, CallError>
    where
        F: Future<Output = Result<serde_json::Value, CallError>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let mut receiver = {
            let mut in_flight = self.in_flight.lock();
            if let Some(sender) = in_flight.get(&key) {
                self.stats.record_coalesced();
                Some(sender.subscribe())
            } else {
                let (tx, _rx) = broadcast::channel(1);
                in_flight.insert(key, tx);
                None
            }
        };

        if let Some(rx) = receiver.take() {
            return self.await_follower(rx).await;
        }

        let result = compute.await;

        let sender = self.in_flight.lock().remove(&key);
        if let Some(sender) = sender {
            let _ = sender.send(result.clone());
        }

        if let Ok(value) = &result {
            self.insert(key, value.clone(), ttl);
        }

        result
    }

    async fn await_follower(
        &self,
        mut rx: broadcast::Receiver<Result<serde_json::Value, CallError>>,
    ) -> Result<serde_json::Value, CallError> {
        match rx.recv().await {
            Ok(result) => result,
            Err(_) => Err(CallError::Cancelled),
        }
    }

    fn insert(&self, key: CacheKey, value: serde_json::Value, ttl: Duration) {
        let mut store = self.store.lock();
        let evicted = store.push(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        if let Some((evicted_key, _)) = evicted {
            if evicted_key != key {
                self.events.emit(&OrchestratorEvent::CacheEvicted {
                    key: evicted_key,
                    reason: EvictionReason::Lru,
                });
            }
        }
    }

    pub fn invalidate(&self, key: &CacheKey) {
        self.store.lock().pop(key);
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn sweep_count(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Removes expired entries proactively, independent of `get` (spec
    /// §4.3: "TTL sweep on a background cadence").
    fn sweep(&self) {
        let mut store = self.store.lock();
        let now = Instant::now();
        let expired: Vec<CacheKey> = store
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(k, _)| *k)
            .collect();
        for key in expired {
            store.pop(&key);
            self.events.emit(&OrchestratorEvent::CacheEvicted {
                key,
                reason: EvictionReason::Ttl,
            });
        }
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    /// Spawns the background TTL sweeper; the returned handle is owned by
    /// the orchestrator so `shutdown()` can abort it (P4).
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if this.shutdown.load(Ordering::Relaxed) {
                    return;
                }
                this.sweep();
            }
        })
    }

    pub fn mark_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
