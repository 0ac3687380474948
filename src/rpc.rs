//! JSON-RPC 2.0 wire types (spec §6: "treated as an opaque request/response
//! codec; only fields the core inspects are called out").
//!
//! The core never branches on anything beyond `method`, `params`, `id`,
//! `result`, and `error.code`.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Request ids wrap at 2^30 (spec §4.1 edge cases, §9): they exist only to
/// match a response to its request inside a single HTTP exchange and carry
/// no ordering meaning.
const ID_WRAP: u32 = 1 << 30;

#[derive(Default)]
pub struct IdGenerator {
    next: AtomicU32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u32 {
        self.next.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
            Some((id + 1) % ID_WRAP)
        })
        .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u32,
    pub method: String,
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    pub fn new(id: u32, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// HTTP status code conventionally used by rate-limited upstreams (spec
/// §4.2: "Rate-limit errors (HTTP 429 or equivalent)").
pub const HTTP_TOO_MANY_REQUESTS: u16 = 429;
