//! Scripted in-memory transport.
//!
//! Each method name maps to a handler that receives the request params.
//! Every request is recorded, so tests can assert how often the node was hit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

type Handler = Arc<dyn Fn(&[Value]) -> Result<Value, TransportError> + Send + Sync>;

/// A transport answering from registered handlers.
///
/// A handler returning `Err(TransportError::Rpc(..))` produces a JSON-RPC
/// error response; any other error is returned as a transport failure.
/// Unregistered methods answer with code `-32601`.
#[derive(Default)]
pub struct MockTransport {
    handlers: Mutex<HashMap<String, Handler>>,
    requests: Mutex<Vec<JsonRpcRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `method` with `result`.
    pub fn on(&self, method: &str, result: Value) -> &Self {
        self.on_fn(method, move |_| Ok(result.clone()))
    }

    /// Always answer `method` with a JSON-RPC error.
    pub fn on_error(&self, method: &str, code: i64, message: &str) -> &Self {
        let err = JsonRpcError::new(code, message);
        self.on_fn(method, move |_| Err(TransportError::Rpc(err.clone())))
    }

    /// Answer `method` by calling `f` with the request params.
    pub fn on_fn<F>(&self, method: &str, f: F) -> &Self
    where
        F: Fn(&[Value]) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(method.to_string(), Arc::new(f));
        self
    }

    /// Number of requests made for `method`.
    pub fn calls(&self, method: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    /// Total number of requests made.
    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Params of every request made for `method`, in order.
    pub fn params(&self, method: &str) -> Vec<Vec<Value>> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.method == method)
            .map(|r| r.params.clone())
            .collect()
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(req.clone());

        let handler = self
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&req.method)
            .cloned();

        let Some(handler) = handler else {
            return Ok(JsonRpcResponse::failure(
                req.id,
                JsonRpcError::new(-32601, format!("method {} not found", req.method)),
            ));
        };

        match handler(&req.params) {
            Ok(result) => Ok(JsonRpcResponse::success(req.id, result)),
            Err(TransportError::Rpc(err)) => Ok(JsonRpcResponse::failure(req.id, err)),
            Err(e) => Err(e),
        }
    }

    fn url(&self) -> &str {
        "mock://node"
    }
}
