//! Spec §8 scenario 2 ("Account batching"):
//!
//! > Configuration: `batch.window_ms=50`, `batch.max_size=10`, mapping
//! > `getAccountInfo -> getMultipleAccounts`. Fire 10
//! > `call("getAccountInfo", [addr_i])` within 5 ms. Expected: exactly 1
//! > upstream `getMultipleAccounts` with the 10 addresses; each caller gets
//! > its address's record.

use std::sync::Arc;
use std::time::Duration;

use rpc_multiplexer::{BatchConfig, CallOptions, OrchestratorConfig};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::endpoint;

fn account_record(addr: &str) -> serde_json::Value {
    serde_json::json!({ "owner": "11111111111111111111111111111111", "lamports": 0, "data": addr })
}

#[tokio::test]
async fn ten_concurrent_calls_collapse_into_one_get_multiple_accounts() {
    let server = MockServer::start().await;
    let addrs: Vec<String> = (0..10).map(|i| format!("addr{i}")).collect();

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(serde_json::json!({ "method": "getMultipleAccounts" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": addrs.iter().map(|a| account_record(a)).collect::<Vec<_>>(),
        })))
        .mount(&server)
        .await;

    let config = OrchestratorConfig::builder()
        .endpoint(endpoint(server.uri()).build())
        .batch(BatchConfig {
            enabled: true,
            window: Duration::from_millis(50),
            max_size: 10,
        })
        .build()
        .unwrap();
    let orch = rpc_multiplexer::Orchestrator::new(config, rpc_multiplexer::EventListeners::new()).unwrap();

    let mut handles = Vec::with_capacity(10);
    for addr in addrs.clone() {
        let orch = Arc::clone(&orch);
        handles.push(tokio::spawn(async move {
            orch.call("getAccountInfo", serde_json::json!(addr.clone()), CallOptions::default())
                .await
                .map(|v| (addr, v))
        }));
    }

    for handle in handles {
        let (addr, record) = handle.await.unwrap().unwrap();
        assert_eq!(record, account_record(&addr));
    }

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let stats = orch.stats();
    assert_eq!(stats.batches_sent, 1);
    assert_eq!(stats.requests_batched, 10);
}
