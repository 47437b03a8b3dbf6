//! The per-process bus unit: endpoint registry and transport callback
//! surface.

use crate::commander::{Commander, RpcEventListener};
use crate::config::BusConfig;
use crate::correlation::CorrelationRegistry;
use crate::endpoint::{Endpoint, EndpointCore};
use crate::error::{BusError, Result};
use crate::monitor::{Monitor, MonitorEventListener};
use crate::router::{EndpointEntry, FrameRouter};
use crate::transport::BusTransport;
use crate::types::FrameHeader;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Observer of unit-level connection events.
///
/// All methods have no-op defaults; implementors override what they care
/// about. Callbacks are synchronous and must return quickly.
pub trait UnitEventListener: Send + Sync {
    /// A local client's connect request succeeded against `remote_unit_id`.
    fn connect_succeeded(&self, _client_id: u8, _remote_unit_id: u8) {}

    /// A local client's connect request failed with a transport code.
    fn connect_failed(&self, _client_id: u8, _code: i32) {}

    /// A previously connected local client lost its connection.
    fn connection_lost(&self, _client_id: u8) {}

    /// The bus reported a connect-state change somewhere on the bus, not
    /// necessarily involving this unit's clients.
    fn global_connect_state_changed(
        &self,
        _unit_id: u8,
        _client_id: u8,
        _client_type: u8,
        _status: u8,
        _info: &str,
    ) {
    }
}

/// One process's presence on the bus.
///
/// The unit owns the endpoint table, the shared correlation registry and the
/// frame router. The transport adapter drives it through the `handle_*`
/// methods; applications drive it through the `create_*` factories.
pub struct BusUnit {
    local_unit_id: u8,
    transport: Arc<dyn BusTransport>,
    endpoints: Arc<Mutex<HashMap<u8, EndpointEntry>>>,
    correlation: CorrelationRegistry,
    router: FrameRouter,
    listener: Option<Arc<dyn UnitEventListener>>,
}

impl BusUnit {
    /// Initialize the transport and create the unit.
    ///
    /// Fails with [`BusError::TransportInit`] if the transport refuses to
    /// initialize; nothing else works after that.
    pub async fn new(
        local_unit_id: u8,
        transport: Arc<dyn BusTransport>,
        listener: Option<Arc<dyn UnitEventListener>>,
    ) -> Result<Self> {
        let code = transport.initialize(local_unit_id).await;
        if code != 0 {
            error!("transport init failed for unit {} (code {})", local_unit_id, code);
            return Err(BusError::TransportInit { code });
        }
        info!("bus unit {} initialized", local_unit_id);

        let endpoints: Arc<Mutex<HashMap<u8, EndpointEntry>>> = Arc::default();
        let correlation = CorrelationRegistry::new();
        let router = FrameRouter::new(Arc::clone(&endpoints), correlation.clone());
        Ok(Self {
            local_unit_id,
            transport,
            endpoints,
            correlation,
            router,
            listener,
        })
    }

    /// The unit id this process occupies on the bus.
    pub fn local_unit_id(&self) -> u8 {
        self.local_unit_id
    }

    /// Number of registered local endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.lock().unwrap().len()
    }

    /// Create a commander endpoint and request its connection.
    ///
    /// The client id must be free on this unit. A transport refusal of the
    /// connect request fails the creation and leaves no endpoint behind; a
    /// transport-accepted request puts the endpoint in `Connecting` until
    /// [`BusUnit::handle_connect_result`] arrives.
    pub async fn create_commander(
        &self,
        client_id: u8,
        host: &str,
        port: u16,
        event_listener: Option<Arc<dyn RpcEventListener>>,
    ) -> Result<Arc<Commander>> {
        let commander = Arc::new(Commander::new(
            EndpointCore::new(
                self.local_unit_id,
                client_id,
                BusConfig::COMMANDER_CLIENT_TYPE,
                host,
                port,
            ),
            self.correlation.clone(),
            Arc::clone(&self.transport),
            event_listener,
        ));
        self.register_endpoint(client_id, EndpointEntry::Commander(Arc::clone(&commander)))?;
        self.request_connect(commander.core()).await?;
        Ok(commander)
    }

    /// Create a monitor endpoint and request its connection.
    pub async fn create_monitor(
        &self,
        client_id: u8,
        host: &str,
        port: u16,
        listener: Option<Arc<dyn MonitorEventListener>>,
    ) -> Result<Arc<Monitor>> {
        let monitor = Monitor::spawn(
            EndpointCore::new(
                self.local_unit_id,
                client_id,
                BusConfig::MONITOR_CLIENT_TYPE,
                host,
                port,
            ),
            listener,
        );
        self.register_endpoint(client_id, EndpointEntry::Monitor(Arc::clone(&monitor)))?;
        self.request_connect(monitor.core()).await?;
        Ok(monitor)
    }

    /// Create a commander together with its paired monitor on `client_id + 1`.
    ///
    /// Fails with [`BusError::PairedIdUnavailable`] when the paired id would
    /// overflow. If the monitor's creation fails, the commander stays
    /// registered and usable on its own.
    pub async fn create_commander_with_monitor(
        &self,
        client_id: u8,
        host: &str,
        port: u16,
        event_listener: Option<Arc<dyn RpcEventListener>>,
        monitor_listener: Option<Arc<dyn MonitorEventListener>>,
    ) -> Result<Arc<Commander>> {
        let monitor_id = client_id
            .checked_add(1)
            .ok_or(BusError::PairedIdUnavailable { id: client_id })?;

        let commander = self
            .create_commander(client_id, host, port, event_listener)
            .await?;
        let monitor = self
            .create_monitor(monitor_id, host, port, monitor_listener)
            .await?;
        commander.set_monitor(monitor);
        Ok(commander)
    }

    fn register_endpoint(&self, client_id: u8, entry: EndpointEntry) -> Result<()> {
        let mut endpoints = self.endpoints.lock().unwrap();
        if endpoints.contains_key(&client_id) {
            return Err(BusError::DuplicateClientId { id: client_id });
        }
        endpoints.insert(client_id, entry);
        Ok(())
    }

    async fn request_connect(&self, core: &EndpointCore) -> Result<()> {
        core.set_connecting();
        info!(
            "client {} connecting to {}:{} (type {})",
            core.client_id(),
            core.host(),
            core.port(),
            core.client_type()
        );
        let code = self
            .transport
            .connect(core.client_id(), core.client_type(), core.host(), core.port())
            .await;
        if code != 0 {
            core.set_disconnected();
            self.endpoints.lock().unwrap().remove(&core.client_id());
            return Err(BusError::ConnectFailed {
                client_id: core.client_id(),
                code,
            });
        }
        Ok(())
    }

    /// Transport callback: the connect request for `client_id` finished.
    pub fn handle_connect_result(&self, client_id: u8, remote_unit_id: u8, code: i32) {
        let entry = self.endpoints.lock().unwrap().get(&client_id).cloned();
        let Some(entry) = entry else {
            warn!("connect result for unknown client {}", client_id);
            return;
        };

        if code == 0 {
            entry.core().set_connected(remote_unit_id);
            info!("client {} connected to unit {}", client_id, remote_unit_id);
            if let Some(listener) = &self.listener {
                listener.connect_succeeded(client_id, remote_unit_id);
            }
        } else {
            entry.core().set_disconnected();
            error!("client {} failed to connect (code {})", client_id, code);
            if let Some(listener) = &self.listener {
                listener.connect_failed(client_id, code);
            }
        }
    }

    /// Transport callback: `client_id` lost its connection.
    ///
    /// The endpoint stays registered; the transport is expected to reconnect
    /// it and report through [`BusUnit::handle_connect_result`] again.
    pub fn handle_disconnected(&self, client_id: u8) {
        let entry = self.endpoints.lock().unwrap().get(&client_id).cloned();
        let Some(entry) = entry else {
            warn!("disconnect for unknown client {}", client_id);
            return;
        };
        entry.core().set_disconnected();
        warn!("client {} disconnected", client_id);
        if let Some(listener) = &self.listener {
            listener.connection_lost(client_id);
        }
    }

    /// Transport callback: a connect-state change observed anywhere on the
    /// bus. Forwarded verbatim to the unit listener.
    pub fn handle_global_connect_state(
        &self,
        unit_id: u8,
        client_id: u8,
        client_type: u8,
        status: u8,
        info: &str,
    ) {
        if let Some(listener) = &self.listener {
            listener.global_connect_state_changed(unit_id, client_id, client_type, status, info);
        }
    }

    /// Transport callback: one inbound frame.
    pub fn handle_frame(&self, header: FrameHeader, payload: &[u8]) {
        self.router.route(header, payload);
    }
}

impl std::fmt::Debug for BusUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusUnit")
            .field("local_unit_id", &self.local_unit_id)
            .field("endpoints", &self.endpoint_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::LinkStatus;
    use crate::types::BusAddress;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI32, Ordering};

    struct ScriptedTransport {
        init_code: i32,
        connect_code: AtomicI32,
    }

    impl ScriptedTransport {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                init_code: 0,
                connect_code: AtomicI32::new(0),
            })
        }
    }

    #[async_trait]
    impl BusTransport for ScriptedTransport {
        async fn initialize(&self, _local_unit_id: u8) -> i32 {
            self.init_code
        }
        async fn connect(&self, _client_id: u8, _client_type: u8, _host: &str, _port: u16) -> i32 {
            self.connect_code.load(Ordering::SeqCst)
        }
        async fn send(&self, _client_id: u8, _destination: BusAddress, _payload: &[u8]) -> i32 {
            0
        }
    }

    #[tokio::test]
    async fn test_transport_init_failure_is_fatal() {
        let transport = Arc::new(ScriptedTransport {
            init_code: -1,
            connect_code: AtomicI32::new(0),
        });
        let err = BusUnit::new(1, transport, None).await.unwrap_err();
        assert!(matches!(err, BusError::TransportInit { code: -1 }));
    }

    #[tokio::test]
    async fn test_create_commander_connects_and_registers() {
        let unit = BusUnit::new(1, ScriptedTransport::ok(), None).await.unwrap();
        let commander = unit
            .create_commander(4, "127.0.0.1", 8088, None)
            .await
            .unwrap();

        assert_eq!(commander.status(), LinkStatus::Connecting);
        assert_eq!(unit.endpoint_count(), 1);

        unit.handle_connect_result(4, 3, 0);
        assert_eq!(commander.status(), LinkStatus::Connected);
        assert_eq!(commander.connected_unit(), Some(3));
    }

    #[tokio::test]
    async fn test_duplicate_client_id_refused() {
        let unit = BusUnit::new(1, ScriptedTransport::ok(), None).await.unwrap();
        unit.create_commander(4, "127.0.0.1", 8088, None)
            .await
            .unwrap();

        let err = unit
            .create_monitor(4, "127.0.0.1", 8088, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::DuplicateClientId { id: 4 }));
        assert_eq!(unit.endpoint_count(), 1);
    }

    #[tokio::test]
    async fn test_refused_connect_leaves_no_endpoint() {
        let transport = Arc::new(ScriptedTransport {
            init_code: 0,
            connect_code: AtomicI32::new(-9),
        });
        let unit = BusUnit::new(1, transport, None).await.unwrap();

        let err = unit
            .create_commander(4, "127.0.0.1", 8088, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::ConnectFailed { client_id: 4, code: -9 }));
        assert_eq!(unit.endpoint_count(), 0);
    }

    #[tokio::test]
    async fn test_paired_creation_takes_adjacent_id() {
        let unit = BusUnit::new(1, ScriptedTransport::ok(), None).await.unwrap();
        let commander = unit
            .create_commander_with_monitor(4, "127.0.0.1", 8088, None, None)
            .await
            .unwrap();

        assert_eq!(unit.endpoint_count(), 2);
        let monitor = commander.monitor().unwrap();
        assert_eq!(monitor.client_id(), 5);
        assert_eq!(monitor.client_type(), BusConfig::MONITOR_CLIENT_TYPE);
    }

    #[tokio::test]
    async fn test_paired_creation_refuses_id_overflow() {
        let unit = BusUnit::new(1, ScriptedTransport::ok(), None).await.unwrap();
        let err = unit
            .create_commander_with_monitor(u8::MAX, "127.0.0.1", 8088, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::PairedIdUnavailable { id: u8::MAX }));
        assert_eq!(unit.endpoint_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_keeps_endpoint_registered() {
        let unit = BusUnit::new(1, ScriptedTransport::ok(), None).await.unwrap();
        let commander = unit
            .create_commander(4, "127.0.0.1", 8088, None)
            .await
            .unwrap();
        unit.handle_connect_result(4, 3, 0);

        unit.handle_disconnected(4);
        assert_eq!(commander.status(), LinkStatus::Disconnected);
        assert_eq!(commander.connected_unit(), Some(3));
        assert_eq!(unit.endpoint_count(), 1);
    }
}
