//! Spec §8 scenario 6 ("Rate limit refund on global denial"):
//!
//! > Endpoint RPS=1/s burst=1, global RPS=1/s burst=1. Fire 2 calls
//! > simultaneously. Expected: the first succeeds; the second either fails
//! > `RateLimited` immediately (`wait_for_ratelimit=false`) or waits ~1 s
//! > then succeeds (`wait_for_ratelimit=true`). The endpoint-level token
//! > consumed by the second call is refunded when the global bucket denies
//! > it, so the endpoint bucket isn't left short once the global window
//! > opens back up.

use std::time::Duration;

use rpc_multiplexer::{CallError, CallOptions, OrchestratorConfig, RateLimiterConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

use super::{endpoint, rpc_ok};

fn config(server_uri: String) -> OrchestratorConfig {
    OrchestratorConfig::builder()
        .endpoint(endpoint(server_uri).rps_limit(1.0).burst(1.0).build())
        .rate_limiter(RateLimiterConfig {
            global_rps_limit: 1.0,
            global_burst: 1.0,
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn second_call_without_waiting_is_rejected_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/")).respond_with(rpc_ok(serde_json::json!(1))).mount(&server).await;

    let orch = rpc_multiplexer::Orchestrator::new(config(server.uri()), rpc_multiplexer::EventListeners::new()).unwrap();
    let opts = CallOptions::builder().wait_for_ratelimit(false).build();

    let first = orch.call("getTokenSupply", serde_json::json!([]), opts.clone()).await;
    assert!(first.is_ok());

    let second = orch.call("getTokenSupply", serde_json::json!([]), opts).await;
    assert!(matches!(second, Err(CallError::RateLimited { .. })), "got {second:?}");

    let stats = orch.stats();
    assert_eq!(stats.rate_limited_total, 1);
}

#[tokio::test]
async fn second_call_that_waits_succeeds_after_the_window_reopens() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/")).respond_with(rpc_ok(serde_json::json!(1))).mount(&server).await;

    let orch =
        rpc_multiplexer::Orchestrator::new(config(server.uri()), rpc_multiplexer::EventListeners::new()).unwrap();
    let opts = CallOptions::builder()
        .wait_for_ratelimit(true)
        .timeout(Duration::from_secs(3))
        .build();

    let first = orch.call("getTokenSupply", serde_json::json!([]), opts.clone()).await;
    assert!(first.is_ok());

    let started = std::time::Instant::now();
    let second = orch.call("getTokenSupply", serde_json::json!([]), opts).await;
    assert!(second.is_ok(), "got {second:?}");
    assert!(started.elapsed() >= Duration::from_millis(700), "expected the caller to wait out the refill window");
}
