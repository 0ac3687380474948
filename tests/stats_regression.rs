//! Stats regression tests.
//!
//! `Orchestrator::stats()` is the in-process counterpart to the metrics
//! surface described in spec §6; these tests pin down which counters move
//! for which scenario so a future change can't silently stop incrementing
//! one without a test noticing.

use rpc_multiplexer::{CallOptions, EventListeners, Orchestrator, OrchestratorConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rpc_ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

async fn single_endpoint(server: &MockServer) -> std::sync::Arc<Orchestrator> {
    let config = OrchestratorConfig::builder()
        .endpoint(rpc_multiplexer::EndpointConfig::builder(server.uri()).build())
        .build()
        .unwrap();
    Orchestrator::new(config, EventListeners::new()).unwrap()
}

#[tokio::test]
async fn calls_total_and_succeeded_move_together_on_a_healthy_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/")).respond_with(rpc_ok(serde_json::json!(1))).mount(&server).await;
    let orch = single_endpoint(&server).await;

    orch.call("getTokenSupply", serde_json::json!([]), CallOptions::default()).await.unwrap();

    let stats = orch.stats();
    assert_eq!(stats.calls_total, 1);
    assert_eq!(stats.calls_succeeded, 1);
    assert_eq!(stats.calls_failed, 0);
}

#[tokio::test]
async fn calls_failed_increments_on_an_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/")).respond_with(ResponseTemplate::new(500)).mount(&server).await;
    let orch = single_endpoint(&server).await;

    let result = orch.call("getTokenSupply", serde_json::json!([]), CallOptions::default()).await;
    assert!(result.is_err());

    let stats = orch.stats();
    assert_eq!(stats.calls_total, 1);
    assert_eq!(stats.calls_failed, 1);
    assert_eq!(stats.calls_succeeded, 0);
}

#[tokio::test]
async fn cache_hits_and_misses_are_distinguished() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/")).respond_with(rpc_ok(serde_json::json!(7))).mount(&server).await;
    let orch = single_endpoint(&server).await;
    let opts = CallOptions::builder().cache_ttl(std::time::Duration::from_secs(1)).build();

    orch.call("getSlot", serde_json::json!([]), opts.clone()).await.unwrap();
    orch.call("getSlot", serde_json::json!([]), opts).await.unwrap();

    let stats = orch.stats();
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.cache_hits, 1);
}

#[tokio::test]
async fn endpoint_inflight_gauge_returns_to_zero_after_the_call_completes() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/")).respond_with(rpc_ok(serde_json::json!(1))).mount(&server).await;
    let orch = single_endpoint(&server).await;

    orch.call("getTokenSupply", serde_json::json!([]), CallOptions::default()).await.unwrap();

    let stats = orch.stats();
    for inflight in stats.endpoint_inflight.values() {
        assert_eq!(*inflight, 0);
    }
}
