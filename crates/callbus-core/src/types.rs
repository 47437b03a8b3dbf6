//! Value types shared across the bus client layer.

use serde::{Deserialize, Serialize};

/// Address of a participant on the bus: the originating unit and the client
/// within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusAddress {
    /// Unit part of the address.
    pub unit_id: u8,
    /// Client part of the address.
    pub client_id: u8,
}

impl BusAddress {
    /// Create a new bus address.
    pub fn new(unit_id: u8, client_id: u8) -> Self {
        Self { unit_id, client_id }
    }
}

impl std::fmt::Display for BusAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.unit_id, self.client_id)
    }
}

/// Message class of an inbound frame, from the transport header's command
/// tag. RPC content travels as tag 3, telemetry as tag 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// RPC-channel content: a request/event or a reply.
    Rpc,
    /// Telemetry-channel content: a server descriptor or load-values record.
    Telemetry,
    /// Any other tag. Ignored by the router.
    Other(u8),
}

impl MessageClass {
    /// Map a wire command tag to a message class.
    pub fn from_wire(tag: u8) -> Self {
        match tag {
            3 => MessageClass::Rpc,
            6 => MessageClass::Telemetry,
            other => MessageClass::Other(other),
        }
    }

    /// The wire command tag for this class.
    pub fn as_wire(&self) -> u8 {
        match self {
            MessageClass::Rpc => 3,
            MessageClass::Telemetry => 6,
            MessageClass::Other(tag) => *tag,
        }
    }
}

/// Decoded header of an inbound frame, as handed over by the transport.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Source address of the frame.
    pub source: BusAddress,
    /// Local client the frame is addressed to.
    pub dst_client_id: u8,
    /// Message class of the payload.
    pub class: MessageClass,
}

impl FrameHeader {
    /// Create a new frame header.
    pub fn new(source: BusAddress, dst_client_id: u8, class: MessageClass) -> Self {
        Self {
            source,
            dst_client_id,
            class,
        }
    }
}
