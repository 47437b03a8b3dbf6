//! Pending-call registry: matches RPC replies to outstanding calls.
//!
//! Every outstanding call is keyed by its correlation id and holds a timer
//! plus a one-shot completion sink. Removal from the map is the arbitration
//! point between a matching reply, the timer firing, and caller-side
//! cancellation: whichever side removes the entry delivers the outcome, the
//! others are no-ops. The sink therefore fires exactly once per id.

use crate::error::{BusError, Result};
use crate::rpc::CallOutcome;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

struct PendingCall {
    sink: oneshot::Sender<CallOutcome>,
    timer: JoinHandle<()>,
}

/// Registry of outstanding RPC calls, shared by all commanders of a unit.
#[derive(Clone, Default)]
pub struct CorrelationRegistry {
    pending: Arc<Mutex<HashMap<String, PendingCall>>>,
}

impl CorrelationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending call and arm its timeout.
    ///
    /// Returns the receiver on which the call's outcome will be delivered.
    /// Fails with [`BusError::DuplicateCorrelationId`] if a call with this id
    /// is already pending.
    pub fn register(&self, id: &str, timeout: Duration) -> Result<oneshot::Receiver<CallOutcome>> {
        let (sink, receiver) = oneshot::channel();
        // The timer is spawned while the lock is held so a completion racing
        // this registration cannot observe the entry before its timer exists.
        let mut pending = self.pending.lock().unwrap();
        if pending.contains_key(id) {
            return Err(BusError::DuplicateCorrelationId { id: id.to_string() });
        }

        let map = Arc::clone(&self.pending);
        let timer_id = id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let entry = map.lock().unwrap().remove(&timer_id);
            if let Some(call) = entry {
                debug!("call {} timed out after {:?}", timer_id, timeout);
                let _ = call.sink.send(CallOutcome::Timeout);
            }
            // Entry already gone: the reply won the race, nothing to do.
        });

        pending.insert(id.to_string(), PendingCall { sink, timer });
        debug!("registered call {} (timeout {:?})", id, timeout);
        Ok(receiver)
    }

    /// Resolve a pending call with `outcome`.
    ///
    /// Returns `true` if this invocation won the race and delivered the
    /// outcome. An absent id (late or duplicate reply, already timed out, or
    /// already cancelled) is a silent no-op returning `false`.
    pub fn complete(&self, id: &str, outcome: CallOutcome) -> bool {
        let entry = self.pending.lock().unwrap().remove(id);
        match entry {
            Some(call) => {
                // Release the timer promptly rather than letting it run out.
                call.timer.abort();
                let _ = call.sink.send(outcome);
                true
            }
            None => {
                debug!("no pending call for correlation id {}", id);
                false
            }
        }
    }

    /// Cancel a pending call from the caller's side.
    ///
    /// Delivers [`CallOutcome::Cancelled`] through the same exactly-once path
    /// as replies and timeouts. Returns `false` if the call had already
    /// resolved.
    pub fn cancel(&self, id: &str) -> bool {
        self.complete(id, CallOutcome::Cancelled)
    }

    /// Number of calls currently pending.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_reply_wins_before_timeout() {
        let registry = CorrelationRegistry::new();
        let receiver = registry
            .register("call-1", Duration::from_millis(2000))
            .unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(registry.complete("call-1", CallOutcome::Result(json!("ok"))));
        assert_eq!(receiver.await.unwrap(), CallOutcome::Result(json!("ok")));
        assert_eq!(registry.pending_count(), 0);

        // The timer was cancelled; advancing past the deadline changes nothing.
        tokio::time::advance(Duration::from_millis(5000)).await;
        assert!(!registry.complete("call-1", CallOutcome::Result(json!("late"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_without_reply() {
        let registry = CorrelationRegistry::new();
        let receiver = registry
            .register("call-2", Duration::from_millis(100))
            .unwrap();

        assert_eq!(receiver.await.unwrap(), CallOutcome::Timeout);
        assert_eq!(registry.pending_count(), 0);

        // A reply arriving after the timeout is dropped silently.
        assert!(!registry.complete("call-2", CallOutcome::Result(json!(1))));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected_while_pending() {
        let registry = CorrelationRegistry::new();
        let _receiver = registry
            .register("dup", Duration::from_secs(30))
            .unwrap();

        let err = registry.register("dup", Duration::from_secs(30)).unwrap_err();
        assert!(matches!(err, BusError::DuplicateCorrelationId { .. }));

        // Once resolved, the id may be reused.
        registry.complete("dup", CallOutcome::Result(json!(null)));
        assert!(registry.register("dup", Duration::from_secs(30)).is_ok());
    }

    #[tokio::test]
    async fn test_complete_unknown_id_is_noop() {
        let registry = CorrelationRegistry::new();
        assert!(!registry.complete("ghost", CallOutcome::Result(json!(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_resolves_call_once() {
        let registry = CorrelationRegistry::new();
        let receiver = registry
            .register("call-3", Duration::from_secs(10))
            .unwrap();

        assert!(registry.cancel("call-3"));
        assert_eq!(receiver.await.unwrap(), CallOutcome::Cancelled);

        // Neither a later reply nor the timer can resolve it again.
        assert!(!registry.complete("call-3", CallOutcome::Result(json!(1))));
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_concurrent_calls_resolve_independently() {
        let registry = CorrelationRegistry::new();
        let fast = registry.register("fast", Duration::from_millis(50)).unwrap();
        let slow = registry.register("slow", Duration::from_secs(60)).unwrap();
        assert_eq!(registry.pending_count(), 2);

        registry.complete("slow", CallOutcome::Result(json!("answer")));
        assert_eq!(fast.await.unwrap(), CallOutcome::Timeout);
        assert_eq!(slow.await.unwrap(), CallOutcome::Result(json!("answer")));
    }
}
