//! Shared helpers for the end-to-end scenario tests (spec §8).

mod account_batching;
mod breaker_isolation;
mod cache_hit_coalescing;
mod hedge_wins_backup;
mod queue_oldest_drop;
mod rate_limit_refund;

use std::time::Duration;

use rpc_multiplexer::{EndpointConfigBuilder, EventListeners, Orchestrator, OrchestratorConfigBuilder};
use wiremock::ResponseTemplate;

/// A `getSlot`-shaped JSON-RPC 2.0 success envelope for a given result.
pub(crate) fn rpc_ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": result,
    }))
}

pub(crate) fn endpoint(url: impl Into<String>) -> EndpointConfigBuilder {
    rpc_multiplexer::EndpointConfig::builder(url).max_concurrent(32).timeout_ms(5_000)
}

/// Builds an `Orchestrator` from a config builder already carrying its
/// endpoints, with no extra event listeners attached.
pub(crate) fn orchestrator(config: OrchestratorConfigBuilder) -> std::sync::Arc<Orchestrator> {
    Orchestrator::new(config.build().unwrap(), EventListeners::new()).unwrap()
}

pub(crate) fn short(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
