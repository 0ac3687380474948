//! Spec §8 scenario 1 ("Cache hit coalescing"):
//!
//! > Configuration: one endpoint, `cache.default_ttl_ms=1000`. Fire 100
//! > `call("getSlot", [])` within 10 ms. Expected: 1 upstream request
//! > observed at the endpoint; 100 callers receive the same slot value.

use std::sync::Arc;
use std::time::Duration;

use rpc_multiplexer::CallOptions;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

use super::{endpoint, orchestrator, rpc_ok};

#[tokio::test]
async fn hundred_concurrent_calls_produce_one_upstream_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(rpc_ok(serde_json::json!(123_456)))
        .mount(&server)
        .await;

    let orch = orchestrator(
        rpc_multiplexer::OrchestratorConfig::builder().endpoint(endpoint(server.uri()).build()),
    );
    let opts = CallOptions::builder().cache_ttl(Duration::from_secs(1)).build();

    let mut handles = Vec::with_capacity(100);
    for _ in 0..100 {
        let orch = Arc::clone(&orch);
        let opts = opts.clone();
        handles.push(tokio::spawn(async move {
            orch.call("getSlot", serde_json::json!([]), opts).await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), serde_json::json!(123_456));
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    let stats = orch.stats();
    assert_eq!(stats.cache_hits + stats.coalesced_requests, 99);
}
