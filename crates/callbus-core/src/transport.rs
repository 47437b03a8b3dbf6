//! Boundary trait for the external bus transport.
//!
//! The wire transport (socket lifecycle, framing, heartbeats, reconnection)
//! lives outside this crate. It is consumed through [`BusTransport`] and, in
//! the other direction, feeds connection results, disconnects and inbound
//! frames into [`crate::BusUnit`]'s `handle_*` methods.
//!
//! Error codes follow the transport's convention: `0` is success, anything
//! else is a transport-defined failure code.

use crate::types::BusAddress;
use async_trait::async_trait;

/// The transport collaborator the bus client layer sends through.
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Initialize the transport for this unit. Called once at startup; a
    /// non-zero code is fatal to the whole unit.
    async fn initialize(&self, local_unit_id: u8) -> i32;

    /// Request a connection for a local client to the bus server at
    /// `host:port`. The eventual result arrives asynchronously through
    /// `BusUnit::handle_connect_result`.
    async fn connect(&self, client_id: u8, client_type: u8, host: &str, port: u16) -> i32;

    /// Send one frame from a local client to a destination address.
    async fn send(&self, client_id: u8, destination: BusAddress, payload: &[u8]) -> i32;
}
