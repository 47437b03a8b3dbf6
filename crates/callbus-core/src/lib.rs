//! Callbus Core - Client-side layer for a message-bus transport.
//!
//! This crate sits between an application and an external bus transport. It
//! manages the process's local endpoints (commanders for RPC, monitors for
//! telemetry), correlates asynchronous RPC replies to their calls with
//! per-call timeouts, routes inbound frames to the right endpoint, and
//! aggregates per-server telemetry into queryable snapshots.
//!
//! The transport itself (sockets, framing, reconnection) is out of scope: it
//! is plugged in through the [`BusTransport`] trait and drives the unit back
//! through [`BusUnit`]'s `handle_*` methods.
//!
//! # Example
//!
//! ```rust,ignore
//! use callbus_core::{BusAddress, BusConfig, BusUnit};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> callbus_core::Result<()> {
//!     let transport = my_transport_adapter();
//!     let unit = BusUnit::new(1, transport, None).await?;
//!
//!     let commander = unit.create_commander(0, "127.0.0.1", 8088, None).await?;
//!     // ... wait for the transport to report the connection ...
//!
//!     let outcome = commander
//!         .call(
//!             BusAddress::new(2, 0),
//!             "getStatus",
//!             json!({"verbose": true}),
//!             BusConfig::DEFAULT_CALL_TIMEOUT,
//!         )
//!         .await?;
//!     println!("call resolved: {:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod commander;
pub mod config;
pub mod correlation;
pub mod endpoint;
pub mod error;
pub mod monitor;
pub mod rpc;
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod unit;

mod router;

// Re-export commonly used types
pub use commander::{Commander, RpcEventListener};
pub use config::{BusConfig, TelemetryConfig};
pub use correlation::CorrelationRegistry;
pub use endpoint::{Endpoint, EndpointCore, LinkStatus};
pub use error::{BusError, Result};
pub use monitor::{Monitor, MonitorEventListener};
pub use rpc::{CallOutcome, RpcPayload, RpcRequest, RpcResponse};
pub use telemetry::ServerInfo;
pub use transport::BusTransport;
pub use types::{BusAddress, FrameHeader, MessageClass};
pub use unit::{BusUnit, UnitEventListener};
