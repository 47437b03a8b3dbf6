//! Commander endpoint: issues RPC calls and receives RPC-channel traffic.

use crate::correlation::CorrelationRegistry;
use crate::endpoint::{Endpoint, EndpointCore};
use crate::error::{BusError, Result};
use crate::monitor::Monitor;
use crate::rpc::{CallOutcome, RpcRequest};
use crate::transport::BusTransport;
use crate::types::BusAddress;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Observer of inbound RPC requests and unsolicited events addressed to a
/// commander.
#[async_trait]
pub trait RpcEventListener: Send + Sync {
    /// An inbound request (or event) arrived from `source`.
    async fn on_event(&self, source: BusAddress, request: RpcRequest);
}

/// A commander endpoint on the bus.
///
/// Commanders are the RPC-capable endpoint variant: they send requests with
/// [`Commander::call`] and hand inbound requests to their [`RpcEventListener`].
/// Created through [`crate::BusUnit::create_commander`].
pub struct Commander {
    core: EndpointCore,
    correlation: CorrelationRegistry,
    transport: Arc<dyn BusTransport>,
    event_listener: Option<Arc<dyn RpcEventListener>>,
    /// The paired monitor, when created via `create_commander_with_monitor`.
    monitor: Mutex<Option<Arc<Monitor>>>,
}

impl Commander {
    pub(crate) fn new(
        core: EndpointCore,
        correlation: CorrelationRegistry,
        transport: Arc<dyn BusTransport>,
        event_listener: Option<Arc<dyn RpcEventListener>>,
    ) -> Self {
        Self {
            core,
            correlation,
            transport,
            event_listener,
            monitor: Mutex::new(None),
        }
    }

    /// Issue an RPC call and await its outcome.
    ///
    /// The outcome resolves exactly once, whichever comes first: the reply, a
    /// send refusal, the timeout, or a [`Commander::cancel`] for the same id.
    /// A fresh correlation id is generated per call.
    pub async fn call(
        &self,
        destination: BusAddress,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<CallOutcome> {
        let id = Uuid::new_v4().to_string();
        self.call_with_id(&id, destination, method, params, timeout)
            .await
    }

    /// Issue an RPC call under a caller-chosen correlation id.
    ///
    /// The id must not collide with a call still pending anywhere on this
    /// unit; a collision fails with [`BusError::DuplicateCorrelationId`]
    /// before anything is sent.
    pub async fn call_with_id(
        &self,
        id: &str,
        destination: BusAddress,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<CallOutcome> {
        let request = RpcRequest::new(id, method, params);
        // Serialize before registering so an encode failure leaves no entry.
        let payload = serde_json::to_vec(&request)?;

        let receiver = self.correlation.register(id, timeout)?;
        debug!(
            "commander<{}> call {} -> {} ({})",
            self.core.client_id(),
            id,
            destination,
            method
        );

        let code = self
            .transport
            .send(self.core.client_id(), destination, &payload)
            .await;
        if code != 0 {
            warn!("send of call {} refused by transport (code {})", id, code);
            // Resolve through the registry so the usual exactly-once path
            // applies even if the timer already fired.
            self.correlation.complete(id, CallOutcome::SendFailed(code));
        }

        receiver.await.map_err(|_| BusError::CallAbandoned {
            id: id.to_string(),
        })
    }

    /// Cancel a pending call issued from this unit.
    ///
    /// The awaiting caller observes [`CallOutcome::Cancelled`]. Returns
    /// `false` if the call had already resolved.
    pub fn cancel(&self, id: &str) -> bool {
        self.correlation.cancel(id)
    }

    /// The monitor paired with this commander, if one was created.
    pub fn monitor(&self) -> Option<Arc<Monitor>> {
        self.monitor.lock().unwrap().clone()
    }

    pub(crate) fn set_monitor(&self, monitor: Arc<Monitor>) {
        *self.monitor.lock().unwrap() = Some(monitor);
    }

    pub(crate) fn event_listener(&self) -> Option<Arc<dyn RpcEventListener>> {
        self.event_listener.clone()
    }
}

impl Endpoint for Commander {
    fn core(&self) -> &EndpointCore {
        &self.core
    }
}

impl std::fmt::Debug for Commander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commander")
            .field("unit_id", &self.core.unit_id())
            .field("client_id", &self.core.client_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    struct ScriptedTransport {
        send_code: AtomicI32,
        sent: Mutex<Vec<(u8, BusAddress, Vec<u8>)>>,
    }

    impl ScriptedTransport {
        fn new(send_code: i32) -> Arc<Self> {
            Arc::new(Self {
                send_code: AtomicI32::new(send_code),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl BusTransport for ScriptedTransport {
        async fn initialize(&self, _local_unit_id: u8) -> i32 {
            0
        }

        async fn connect(&self, _client_id: u8, _client_type: u8, _host: &str, _port: u16) -> i32 {
            0
        }

        async fn send(&self, client_id: u8, destination: BusAddress, payload: &[u8]) -> i32 {
            self.sent
                .lock()
                .unwrap()
                .push((client_id, destination, payload.to_vec()));
            self.send_code.load(Ordering::SeqCst)
        }
    }

    fn commander_on(transport: Arc<ScriptedTransport>) -> (Commander, CorrelationRegistry) {
        let correlation = CorrelationRegistry::new();
        let core = EndpointCore::new(1, 4, BusConfig::COMMANDER_CLIENT_TYPE, "127.0.0.1", 8088);
        let commander = Commander::new(core, correlation.clone(), transport, None);
        (commander, correlation)
    }

    #[tokio::test]
    async fn test_call_sends_request_and_resolves_on_reply() {
        let transport = ScriptedTransport::new(0);
        let (commander, correlation) = commander_on(transport.clone());
        let destination = BusAddress::new(2, 7);

        let call = commander.call_with_id(
            "c-1",
            destination,
            "getStatus",
            json!({"verbose": true}),
            Duration::from_secs(30),
        );
        let reply = async {
            correlation.complete("c-1", CallOutcome::Result(json!("up")));
        };
        let (outcome, ()) = tokio::join!(call, reply);
        assert_eq!(outcome.unwrap(), CallOutcome::Result(json!("up")));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (client_id, dst, payload) = &sent[0];
        assert_eq!(*client_id, 4);
        assert_eq!(*dst, destination);
        let request: RpcRequest = serde_json::from_slice(payload).unwrap();
        assert_eq!(request.id, "c-1");
        assert_eq!(request.method, "getStatus");
    }

    #[tokio::test]
    async fn test_send_refusal_resolves_with_send_failed() {
        let transport = ScriptedTransport::new(-7);
        let (commander, correlation) = commander_on(transport);

        let outcome = commander
            .call(
                BusAddress::new(2, 7),
                "ping",
                json!(null),
                Duration::from_secs(30),
            )
            .await
            .unwrap();
        assert_eq!(outcome, CallOutcome::SendFailed(-7));
        assert_eq!(correlation.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out_without_reply() {
        let transport = ScriptedTransport::new(0);
        let (commander, _) = commander_on(transport);

        let outcome = commander
            .call(
                BusAddress::new(2, 7),
                "ping",
                json!(null),
                Duration::from_millis(100),
            )
            .await
            .unwrap();
        assert_eq!(outcome, CallOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_cancel_resolves_pending_call() {
        let transport = ScriptedTransport::new(0);
        let (commander, _) = commander_on(transport);

        let call = commander.call_with_id(
            "c-9",
            BusAddress::new(2, 7),
            "slowOp",
            json!(null),
            Duration::from_secs(60),
        );
        let cancel = async {
            tokio::task::yield_now().await;
            assert!(commander.cancel("c-9"));
        };
        let (outcome, ()) = tokio::join!(call, cancel);
        assert_eq!(outcome.unwrap(), CallOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_duplicate_correlation_id_fails_before_send() {
        let transport = ScriptedTransport::new(0);
        let (commander, correlation) = commander_on(transport.clone());
        let _pending = correlation.register("dup", Duration::from_secs(30)).unwrap();

        let err = commander
            .call_with_id(
                "dup",
                BusAddress::new(2, 7),
                "ping",
                json!(null),
                Duration::from_secs(30),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::DuplicateCorrelationId { .. }));
        assert!(transport.sent.lock().unwrap().is_empty());
    }
}
