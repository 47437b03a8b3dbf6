//! RPC wire types and payload discrimination.
//!
//! Requests and replies share the RPC channel and are structurally
//! distinguished by which fields are present: a request carries `method`, a
//! reply carries `result` or `error`. [`RpcPayload::decode`] probes
//! request-first in one place so the policy is explicit.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An RPC request (or unsolicited event) on the RPC channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Correlation id, echoed by the reply.
    pub id: String,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Create a new request.
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params: Some(params),
        }
    }
}

/// An RPC reply on the RPC channel. Carries a result or an error, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Correlation id of the request being answered.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl RpcResponse {
    /// Create a success reply.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error reply.
    pub fn error(id: impl Into<String>, error: Value) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }
}

/// One decoded RPC-channel payload.
#[derive(Debug, Clone)]
pub enum RpcPayload {
    /// Request shape (has `method`).
    Request(RpcRequest),
    /// Reply shape (has `id`, no `method`).
    Response(RpcResponse),
    /// Neither shape. Logged and dropped by the router.
    Unrecognized,
}

impl RpcPayload {
    /// Decode an RPC-channel payload, request-first.
    ///
    /// A payload that satisfies both shapes (a request body also decodes as
    /// a reply, since extra fields are ignored) is treated as a request.
    pub fn decode(text: &str) -> Self {
        if let Ok(req) = serde_json::from_str::<RpcRequest>(text) {
            return RpcPayload::Request(req);
        }
        if let Ok(res) = serde_json::from_str::<RpcResponse>(text) {
            return RpcPayload::Response(res);
        }
        RpcPayload::Unrecognized
    }
}

/// Outcome of one RPC call, delivered to the caller exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The remote endpoint replied with a result.
    Result(Value),
    /// The remote endpoint replied with an error.
    Error(Value),
    /// No reply arrived within the call's timeout.
    Timeout,
    /// The caller cancelled the call before a reply arrived.
    Cancelled,
    /// The transport refused the outbound frame.
    SendFailed(i32),
}

impl From<RpcResponse> for CallOutcome {
    fn from(response: RpcResponse) -> Self {
        match response.error {
            Some(error) => CallOutcome::Error(error),
            None => CallOutcome::Result(response.result.unwrap_or(Value::Null)),
        }
    }
}
