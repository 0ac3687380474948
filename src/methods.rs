//! Compile-time method metadata table (spec §9: "Dynamic method dispatch on
//! RPC names becomes a compile-time table of method metadata").
//!
//! Unknown methods route through the non-batchable, non-hedgeable path via
//! [`MethodMeta::default`].

use std::time::Duration;

use crate::config::Commitment;

/// Static, per-method defaults consulted by the orchestrator before it
/// touches the cache, batch, or hedge subsystems.
#[derive(Debug, Clone, Copy)]
pub struct MethodMeta {
    /// The multi-target method this single-target method collapses into,
    /// when declared batchable (spec §6's batchable-methods table).
    pub batched_method: Option<&'static str>,
    pub hedgeable_default: bool,
    pub cache_ttl_default: Option<Duration>,
    pub commitment_default: Commitment,
}

impl Default for MethodMeta {
    fn default() -> Self {
        Self {
            batched_method: None,
            hedgeable_default: false,
            cache_ttl_default: None,
            commitment_default: Commitment::Confirmed,
        }
    }
}

/// Looks up the static metadata row for `method`, falling back to
/// [`MethodMeta::default`] for anything not named here.
pub fn lookup(method: &str) -> MethodMeta {
    match method {
        "getAccountInfo" => MethodMeta {
            batched_method: Some("getMultipleAccounts"),
            cache_ttl_default: Some(Duration::from_millis(400)),
            ..MethodMeta::default()
        },
        "getBalance" => MethodMeta {
            batched_method: Some("getMultipleAccounts"),
            cache_ttl_default: Some(Duration::from_millis(400)),
            ..MethodMeta::default()
        },
        "getSlot" => MethodMeta {
            hedgeable_default: true,
            cache_ttl_default: Some(Duration::from_millis(100)),
            ..MethodMeta::default()
        },
        "getLatestBlockhash" => MethodMeta {
            hedgeable_default: true,
            cache_ttl_default: Some(Duration::from_millis(400)),
            ..MethodMeta::default()
        },
        "getTokenSupply" => MethodMeta {
            cache_ttl_default: Some(Duration::from_millis(1_000)),
            ..MethodMeta::default()
        },
        "getProgramAccounts" => MethodMeta {
            cache_ttl_default: None,
            ..MethodMeta::default()
        },
        "getSignaturesForAddress" => MethodMeta {
            cache_ttl_default: Some(Duration::from_millis(1_000)),
            ..MethodMeta::default()
        },
        "getTransaction" => MethodMeta {
            cache_ttl_default: Some(Duration::from_secs(3600)),
            commitment_default: Commitment::Finalized,
            ..MethodMeta::default()
        },
        _ => MethodMeta::default(),
    }
}

/// Returns the field name on a `getMultipleAccounts`-shaped account record
/// this single method transforms to, for the per-member routing described
/// in spec §4.4 (`return the i-th account record` / `native balance field`).
pub fn single_result_transform(method: &str, account_record: &serde_json::Value) -> serde_json::Value {
    match method {
        "getBalance" => account_record
            .get("lamports")
            .cloned()
            .unwrap_or(serde_json::Value::Null),
        // getAccountInfo and anything else: the record itself.
        _ => account_record.clone(),
    }
}
