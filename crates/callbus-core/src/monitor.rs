//! Monitor endpoint: consumes the telemetry channel for one bus connection.

use crate::endpoint::{Endpoint, EndpointCore};
use crate::telemetry::{ingest_record, ServerInfo};
use crate::types::BusAddress;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Observer of server-load changes seen by a monitor.
#[async_trait]
pub trait MonitorEventListener: Send + Sync {
    /// A load-values record for `server` was applied. `server` is a snapshot
    /// taken at that moment; later ingests do not affect it.
    async fn on_server_load_changed(&self, source: BusAddress, server: ServerInfo);
}

/// A monitor endpoint on the bus.
///
/// Telemetry frames routed to this endpoint are consumed by a single worker
/// task, so updates and notifications for any one server id happen in ingest
/// order. Created through [`crate::BusUnit::create_monitor`].
pub struct Monitor {
    core: EndpointCore,
    servers: Arc<Mutex<HashMap<String, ServerInfo>>>,
    ingest_tx: mpsc::UnboundedSender<(BusAddress, String)>,
}

impl Monitor {
    pub(crate) fn spawn(
        core: EndpointCore,
        listener: Option<Arc<dyn MonitorEventListener>>,
    ) -> Arc<Self> {
        let servers: Arc<Mutex<HashMap<String, ServerInfo>>> = Arc::default();
        let (ingest_tx, mut ingest_rx) = mpsc::unbounded_channel::<(BusAddress, String)>();

        let worker_servers = Arc::clone(&servers);
        let client_id = core.client_id();
        tokio::spawn(async move {
            while let Some((source, text)) = ingest_rx.recv().await {
                // Mutation and snapshot happen under the lock; the listener
                // runs after it is released.
                let snapshot = {
                    let mut servers = worker_servers.lock().unwrap();
                    match ingest_record(&mut servers, &text) {
                        Ok(snapshot) => snapshot,
                        Err(e) => {
                            warn!("monitor<{}> dropped telemetry from {}: {}", client_id, source, e);
                            None
                        }
                    }
                };
                if let Some(snapshot) = snapshot {
                    if let Some(listener) = &listener {
                        listener.on_server_load_changed(source, snapshot).await;
                    }
                }
            }
            debug!("monitor<{}> telemetry worker stopped", client_id);
        });

        Arc::new(Self {
            core,
            servers,
            ingest_tx,
        })
    }

    /// Hand one telemetry frame to the aggregation worker.
    pub(crate) fn ingest(&self, source: BusAddress, text: String) {
        if self.ingest_tx.send((source, text)).is_err() {
            warn!("monitor<{}> telemetry worker is gone", self.core.client_id());
        }
    }

    /// A deep copy of the accumulated per-server telemetry.
    pub fn server_info_map(&self) -> HashMap<String, ServerInfo> {
        self.servers.lock().unwrap().clone()
    }
}

impl Endpoint for Monitor {
    fn core(&self) -> &EndpointCore {
        &self.core
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("unit_id", &self.core.unit_id())
            .field("client_id", &self.core.client_id())
            .finish()
    }
}
