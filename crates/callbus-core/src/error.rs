//! Error types for the bus client layer.
//!
//! Errors local to one RPC call or one telemetry frame are contained and
//! surfaced only through that call's outcome channel or the log; they never
//! take down routing for other endpoints. Only transport initialization
//! failure is fatal.

use thiserror::Error;

/// Main error type for the bus client layer.
#[derive(Debug, Error)]
pub enum BusError {
    /// The transport library failed to initialize. Fatal at startup.
    #[error("transport initialization failed with code {code}")]
    TransportInit { code: i32 },

    /// The transport rejected a connection request for a local client.
    #[error("connect request for client {client_id} failed with code {code}")]
    ConnectFailed { client_id: u8, code: i32 },

    /// The transport rejected an outbound frame. Per-call, surfaced to the
    /// caller of that call only.
    #[error("send failed with code {code}")]
    SendFailed { code: i32 },

    /// A correlation id was reused while a call with that id is still
    /// pending. Programmer error.
    #[error("correlation id {id} already has a pending call")]
    DuplicateCorrelationId { id: String },

    /// A local client id was reused at endpoint creation. Programmer error.
    #[error("local client id {id} is already registered")]
    DuplicateClientId { id: u8 },

    /// No free client id for the paired monitor of a commander.
    #[error("no client id available for the paired monitor (commander id {id})")]
    PairedIdUnavailable { id: u8 },

    /// A telemetry frame could not be applied; the server's prior state is
    /// left unchanged.
    #[error("malformed telemetry: {message}")]
    MalformedTelemetry { message: String },

    /// The registry was torn down before the call's outcome was delivered.
    #[error("call {id} was abandoned before an outcome was delivered")]
    CallAbandoned { id: String },

    /// JSON serialization failure, surfaced to the local caller only.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using BusError.
pub type Result<T> = std::result::Result<T, BusError>;
