//! Shared endpoint state for commanders and monitors.

use std::sync::Mutex;

/// Connection status of a local endpoint, driven by transport callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Not connected to a bus server.
    Disconnected,
    /// A connect request is in flight.
    Connecting,
    /// Connected to a bus server.
    Connected,
}

#[derive(Debug)]
struct LinkState {
    status: LinkStatus,
    /// Unit id of the bus server this endpoint connected to. None until the
    /// first successful connect.
    connected_unit: Option<u8>,
}

/// State common to both endpoint variants: identity, target server and link
/// status.
#[derive(Debug)]
pub struct EndpointCore {
    unit_id: u8,
    client_id: u8,
    client_type: u8,
    host: String,
    port: u16,
    link: Mutex<LinkState>,
}

impl EndpointCore {
    pub(crate) fn new(unit_id: u8, client_id: u8, client_type: u8, host: &str, port: u16) -> Self {
        Self {
            unit_id,
            client_id,
            client_type,
            host: host.to_string(),
            port,
            link: Mutex::new(LinkState {
                status: LinkStatus::Disconnected,
                connected_unit: None,
            }),
        }
    }

    /// The local unit this endpoint belongs to.
    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    /// The endpoint's local client id.
    pub fn client_id(&self) -> u8 {
        self.client_id
    }

    /// The endpoint's wire client-type tag.
    pub fn client_type(&self) -> u8 {
        self.client_type
    }

    /// Host of the bus server this endpoint targets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port of the bus server this endpoint targets.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current link status.
    pub fn status(&self) -> LinkStatus {
        self.link.lock().unwrap().status
    }

    /// Unit id of the bus server this endpoint last connected to.
    pub fn connected_unit(&self) -> Option<u8> {
        self.link.lock().unwrap().connected_unit
    }

    pub(crate) fn set_connecting(&self) {
        self.link.lock().unwrap().status = LinkStatus::Connecting;
    }

    pub(crate) fn set_connected(&self, remote_unit_id: u8) {
        let mut link = self.link.lock().unwrap();
        link.status = LinkStatus::Connected;
        link.connected_unit = Some(remote_unit_id);
    }

    pub(crate) fn set_disconnected(&self) {
        self.link.lock().unwrap().status = LinkStatus::Disconnected;
    }
}

/// Accessors shared by both endpoint variants.
pub trait Endpoint {
    /// Shared endpoint state.
    fn core(&self) -> &EndpointCore;

    /// The endpoint's local client id.
    fn client_id(&self) -> u8 {
        self.core().client_id()
    }

    /// The endpoint's wire client-type tag.
    fn client_type(&self) -> u8 {
        self.core().client_type()
    }

    /// Current link status.
    fn status(&self) -> LinkStatus {
        self.core().status()
    }

    /// Unit id of the bus server this endpoint last connected to, if any.
    fn connected_unit(&self) -> Option<u8> {
        self.core().connected_unit()
    }
}
