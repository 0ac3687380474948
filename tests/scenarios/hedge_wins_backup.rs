//! Spec §8 scenario 3 ("Hedge wins on a slow primary"):
//!
//! > Configuration: two endpoints, `hedge.delay_ms=100`. Endpoint A hangs
//! > for 2 s; endpoint B answers in 30 ms. Call `getSlot` (hedgeable).
//! > Expected: the caller gets B's result around 130 ms, not A's.

use std::time::Duration;

use rpc_multiplexer::{HedgeConfig, OrchestratorConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{endpoint, rpc_ok};

#[tokio::test]
async fn backup_result_wins_over_a_hanging_primary() {
    let slow = MockServer::start().await;
    let fast = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(rpc_ok(serde_json::json!(1)).set_delay(Duration::from_secs(2)))
        .mount(&slow)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(rpc_ok(serde_json::json!(2)).set_delay(Duration::from_millis(30)))
        .mount(&fast)
        .await;

    let config = OrchestratorConfig::builder()
        .endpoint(endpoint(slow.uri()).priority(0).build())
        .endpoint(endpoint(fast.uri()).priority(1).build())
        .hedge(HedgeConfig {
            delay: Duration::from_millis(100),
            max_backups: 1,
            ..HedgeConfig::default()
        })
        .build()
        .unwrap();
    let orch = rpc_multiplexer::Orchestrator::new(config, rpc_multiplexer::EventListeners::new()).unwrap();

    let started = std::time::Instant::now();
    let result = orch
        .call("getSlot", serde_json::json!([]), rpc_multiplexer::CallOptions::default())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result, serde_json::json!(2));
    assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}, expected the backup to win quickly");

    let stats = orch.stats();
    assert_eq!(stats.hedge_wins_backup, 1);
    assert_eq!(stats.hedge_wins_primary, 0);
}
