//! Inbound frame routing.
//!
//! One router per unit. Frames are routed by destination client id, then by
//! message class against the endpoint's variant: RPC frames belong to
//! commanders, telemetry frames to monitors. Everything else is logged and
//! dropped so one bad frame never takes the dispatch path down.

use crate::commander::Commander;
use crate::correlation::CorrelationRegistry;
use crate::endpoint::{Endpoint, EndpointCore};
use crate::monitor::Monitor;
use crate::rpc::RpcPayload;
use crate::types::{FrameHeader, MessageClass};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// A registered local endpoint, keyed by client id in the unit's table.
#[derive(Clone)]
pub(crate) enum EndpointEntry {
    Commander(Arc<Commander>),
    Monitor(Arc<Monitor>),
}

impl EndpointEntry {
    pub(crate) fn core(&self) -> &EndpointCore {
        match self {
            EndpointEntry::Commander(commander) => commander.core(),
            EndpointEntry::Monitor(monitor) => monitor.core(),
        }
    }
}

pub(crate) struct FrameRouter {
    endpoints: Arc<Mutex<HashMap<u8, EndpointEntry>>>,
    correlation: CorrelationRegistry,
}

impl FrameRouter {
    pub(crate) fn new(
        endpoints: Arc<Mutex<HashMap<u8, EndpointEntry>>>,
        correlation: CorrelationRegistry,
    ) -> Self {
        Self {
            endpoints,
            correlation,
        }
    }

    /// Route one inbound frame. Never blocks on listener work: RPC dispatch
    /// runs on a spawned task, telemetry goes through the monitor's worker.
    pub(crate) fn route(&self, header: FrameHeader, payload: &[u8]) {
        let entry = self
            .endpoints
            .lock()
            .unwrap()
            .get(&header.dst_client_id)
            .cloned();
        let Some(entry) = entry else {
            warn!(
                "dropping frame from {} for unknown client {}",
                header.source, header.dst_client_id
            );
            return;
        };

        match (header.class, entry) {
            (MessageClass::Rpc, EndpointEntry::Commander(commander)) => {
                let Ok(text) = std::str::from_utf8(payload) else {
                    warn!("dropping non-UTF-8 RPC frame from {}", header.source);
                    return;
                };
                self.dispatch_rpc(commander, header, text.to_string());
            }
            (MessageClass::Telemetry, EndpointEntry::Monitor(monitor)) => {
                let Ok(text) = std::str::from_utf8(payload) else {
                    warn!("dropping non-UTF-8 telemetry frame from {}", header.source);
                    return;
                };
                monitor.ingest(header.source, text.to_string());
            }
            (MessageClass::Rpc, EndpointEntry::Monitor(_)) => {
                warn!(
                    "dropping RPC frame from {} addressed to monitor {}",
                    header.source, header.dst_client_id
                );
            }
            (MessageClass::Telemetry, EndpointEntry::Commander(_)) => {
                warn!(
                    "dropping telemetry frame from {} addressed to commander {}",
                    header.source, header.dst_client_id
                );
            }
            (MessageClass::Other(tag), _) => {
                debug!(
                    "ignoring frame from {} with unsupported class {}",
                    header.source, tag
                );
            }
        }
    }

    fn dispatch_rpc(&self, commander: Arc<Commander>, header: FrameHeader, text: String) {
        let correlation = self.correlation.clone();
        tokio::spawn(async move {
            match RpcPayload::decode(&text) {
                RpcPayload::Request(request) => match commander.event_listener() {
                    Some(listener) => listener.on_event(header.source, request).await,
                    None => debug!(
                        "commander {} has no event listener, dropping request {}",
                        header.dst_client_id, request.id
                    ),
                },
                RpcPayload::Response(response) => {
                    let id = response.id.clone();
                    if !correlation.complete(&id, response.into()) {
                        debug!("reply for {} arrived after the call resolved", id);
                    }
                }
                RpcPayload::Unrecognized => {
                    warn!("unrecognized RPC payload from {}: {}", header.source, text);
                }
            }
        });
    }
}
