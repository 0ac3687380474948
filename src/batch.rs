//! Batch manager: collapses concurrent batchable single-target calls into
//! one multi-target upstream call (spec §4.4).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::config::{BatchConfig, Commitment};
use crate::error::CallError;
use crate::events::{EventListeners, OrchestratorEvent};
use crate::methods::single_result_transform;
use crate::stats::StatsRecorder;

/// Dispatches a single upstream call for `batched_method` with the merged
/// `params` (the group's addresses plus a shared config object), returning
/// the decoded `result` array/value.
pub type BatchDispatcher =
    Arc<dyn Fn(&'static str, serde_json::Value) -> BoxFuture<'static, Result<serde_json::Value, CallError>> + Send + Sync>;

struct PendingItem {
    method: &'static str,
    param: serde_json::Value,
    responder: oneshot::Sender<Result<serde_json::Value, CallError>>,
}

struct BatchGroup {
    items: Vec<PendingItem>,
    config_param: Option<serde_json::Value>,
    first_added: Instant,
}

type GroupKey = (&'static str, Commitment);

/// Owns all pending batch groups and their trigger timers.
pub struct BatchManager {
    config: BatchConfig,
    groups: Mutex<HashMap<GroupKey, Arc<Mutex<Option<BatchGroup>>>>>,
    dispatcher: BatchDispatcher,
    events: EventListeners,
    stats: Arc<StatsRecorder>,
}

impl BatchManager {
    pub fn new(
        config: BatchConfig,
        dispatcher: BatchDispatcher,
        events: EventListeners,
        stats: Arc<StatsRecorder>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            groups: Mutex::new(HashMap::new()),
            dispatcher,
            events,
            stats,
        })
    }

    /// Enqueues a single-target call, returning this caller's slice of the
    /// eventual batched response. The per-item `param` is typically the
    /// single address; `config_param`, if present, is shared across the
    /// group (e.g. an encoding/commitment config object).
    pub async fn add(
        self: &Arc<Self>,
        method: &'static str,
        batched_method: &'static str,
        commitment: Commitment,
        param: serde_json::Value,
        config_param: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, CallError> {
        let (tx, rx) = oneshot::channel();
        let key = (batched_method, commitment);

        let should_dispatch_now = {
            let mut groups = self.groups.lock();
            let handle = groups
                .entry(key)
                .or_insert_with(|| {
                    let handle = Arc::new(Mutex::new(Some(BatchGroup {
                        items: Vec::new(),
                        config_param: None,
                        first_added: Instant::now(),
                    })));
                    self.spawn_timer(key, Arc::clone(&handle));
                    handle
                })
                .clone();

            let mut slot = handle.lock();
            let at_cap = if let Some(group) = slot.as_mut() {
                group.items.push(PendingItem {
                    method,
                    param,
                    responder: tx,
                });
                if group.config_param.is_none() {
                    group.config_param = config_param;
                }
                group.items.len() >= self.config.max_size
            } else {
                false
            };
            drop(slot);

            if at_cap {
                groups.remove(&key);
                Some(handle)
            } else {
                None
            }
        };

        if let Some(handle) = should_dispatch_now {
            self.dispatch(key, handle).await;
        }

        rx.await.unwrap_or(Err(CallError::Cancelled))
    }

    fn spawn_timer(self: &Arc<Self>, key: GroupKey, handle: Arc<Mutex<Option<BatchGroup>>>) {
        let this = Arc::clone(self);
        let window = this.config.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let still_owned = {
                let mut groups = this.groups.lock();
                groups.remove(&key).is_some()
            };
            if still_owned {
                this.dispatch(key, handle).await;
            }
        });
    }

    /// Forces dispatch of every currently pending group.
    pub async fn flush(self: &Arc<Self>) {
        let handles: Vec<(GroupKey, Arc<Mutex<Option<BatchGroup>>>)> = {
            let mut groups = self.groups.lock();
            groups.drain().collect()
        };
        for (key, handle) in handles {
            self.dispatch(key, handle).await;
        }
    }

    async fn dispatch(self: &Arc<Self>, key: GroupKey, handle: Arc<Mutex<Option<BatchGroup>>>) {
        let group = match handle.lock().take() {
            Some(group) => group,
            None => return,
        };
        let (batched_method, _commitment) = key;
        if group.items.is_empty() {
            return;
        }

        let size = group.items.len();
        let params = serde_json::json!([
            group.items.iter().map(|i| i.param.clone()).collect::<Vec<_>>(),
            group.config_param.clone().unwrap_or(serde_json::Value::Null),
        ]);

        self.stats.record_batch_sent(size as u64);
        self.events.emit(&OrchestratorEvent::BatchDispatched {
            method: batched_method,
            size,
        });

        let outcome = (self.dispatcher)(batched_method, params).await;

        match outcome {
            Ok(serde_json::Value::Array(records)) => {
                for (idx, item) in group.items.into_iter().enumerate() {
                    let record = records.get(idx).cloned().unwrap_or(serde_json::Value::Null);
                    let result = if record.is_null() {
                        Err(CallError::Upstream {
                            endpoint: crate::selector::EndpointId(0),
                            status: None,
                            body_kind: "account_not_found".into(),
                            cause: None,
                        })
                    } else {
                        Ok(single_result_transform(item.method, &record))
                    };
                    let _ = item.responder.send(result);
                }
            }
            Ok(other) => {
                // Non-array batched result: not decodable per-item; every
                // member observes the same decode failure.
                for item in group.items {
                    let _ = item.responder.send(Err(CallError::Upstream {
                        endpoint: crate::selector::EndpointId(0),
                        status: None,
                        body_kind: format!("unexpected batch shape: {other}"),
                        cause: None,
                    }));
                }
            }
            Err(err) => {
                // Batch-level failure propagates to every member (spec
                // §4.4: "Errors at batch granularity propagate to every
                // member").
                for item in group.items {
                    let _ = item.responder.send(Err(err.clone()));
                }
            }
        }
    }

    /// Age of the oldest pending group, if any — used by the leak guard to
    /// confirm no group silently outlives its window (I5 discipline).
    pub fn oldest_pending_age(&self) -> Option<Duration> {
        self.groups
            .lock()
            .values()
            .filter_map(|h| h.lock().as_ref().map(|g| g.first_added.elapsed()))
            .max()
    }
}
