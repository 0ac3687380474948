//! Hedged-request manager: races a delayed backup against a primary to
//! clip tail latency (spec §4.5).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::CallError;
use crate::events::{EventListeners, HedgeArm, OrchestratorEvent};
use crate::selector::EndpointId;
use crate::stats::StatsRecorder;

/// Attempts a call against an endpoint not in `exclude`, returning the
/// endpoint it actually used (if selection succeeded at all) alongside the
/// outcome. Knowing the endpoint even on failure lets the manager avoid
/// re-trying the same upstream on the next backup (spec §4.6 exclusion).
pub type HedgeAttempt = Arc<
    dyn Fn(HashSet<EndpointId>) -> BoxFuture<'static, (Option<EndpointId>, Result<serde_json::Value, CallError>)>
        + Send
        + Sync,
>;

pub struct HedgedManager {
    events: EventListeners,
    stats: Arc<StatsRecorder>,
}

impl HedgedManager {
    pub fn new(events: EventListeners, stats: Arc<StatsRecorder>) -> Self {
        Self { events, stats }
    }

    /// Runs `attempt` immediately as the primary; after `delay`, if still
    /// pending, starts up to `max_backups` backups staggered by `delay`.
    /// The first arm to succeed wins and the rest are aborted (best
    /// effort); if every arm fails, the first error observed is returned.
    pub async fn hedged(
        &self,
        method: &'static str,
        delay: Duration,
        max_backups: usize,
        attempt: HedgeAttempt,
    ) -> Result<serde_json::Value, CallError> {
        let start = std::time::Instant::now();
        let mut tried: HashSet<EndpointId> = HashSet::new();
        let mut handles: Vec<(HedgeArm, tokio::task::JoinHandle<(Option<EndpointId>, Result<serde_json::Value, CallError>)>)> =
            Vec::new();

        let primary_attempt = Arc::clone(&attempt);
        handles.push((
            HedgeArm::Primary,
            tokio::spawn(async move { primary_attempt(HashSet::new()).await }),
        ));

        let mut backups_spawned = 0usize;
        let mut first_error: Option<CallError> = None;
        let mut delay_timer = Box::pin(tokio::time::sleep(delay));

        loop {
            if handles.is_empty() {
                return Err(first_error.unwrap_or(CallError::Cancelled));
            }

            let arm_futures = handles.iter_mut().map(|(_, h)| h);
            tokio::select! {
                biased;

                (result, index, _remaining) = futures::future::select_all(arm_futures) => {
                    let (arm, _) = handles.remove(index);
                    match result {
                        Ok((endpoint, Ok(value))) => {
                            if let Some(endpoint) = endpoint {
                                tried.insert(endpoint);
                            }
                            for (_, h) in handles.drain(..) {
                                h.abort();
                            }
                            match arm {
                                HedgeArm::Primary => self.stats.record_hedge_win_primary(),
                                HedgeArm::Backup(_) => self.stats.record_hedge_win_backup(),
                            }
                            self.events.emit(&OrchestratorEvent::HedgeWon {
                                method,
                                arm,
                                elapsed: start.elapsed(),
                            });
                            return Ok(value);
                        }
                        Ok((endpoint, Err(err))) => {
                            if let Some(endpoint) = endpoint {
                                tried.insert(endpoint);
                            }
                            if first_error.is_none() {
                                first_error = Some(err);
                            }
                        }
                        Err(_join_err) => {
                            if first_error.is_none() {
                                first_error = Some(CallError::Cancelled);
                            }
                        }
                    }
                }

                _ = &mut delay_timer, if backups_spawned < max_backups => {
                    backups_spawned += 1;
                    self.events.emit(&OrchestratorEvent::HedgeRaced { method, delay });
                    let exclude = tried.clone();
                    let backup_attempt = Arc::clone(&attempt);
                    handles.push((
                        HedgeArm::Backup(backups_spawned),
                        tokio::spawn(async move { backup_attempt(exclude).await }),
                    ));
                    delay_timer = Box::pin(tokio::time::sleep(delay));
                }
            }
        }
    }

    /// True unless `method` is on the non-hedgeable allow-list override
    /// (spec §4.5: "Any method whose side effects or idempotency is
    /// unclear...is not hedged").
    pub fn is_hedgeable(method: &str, non_hedgeable: &[&'static str], default: bool) -> bool {
        if non_hedgeable.contains(&method) {
            return false;
        }
        default
    }
}
