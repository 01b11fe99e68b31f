//! RequestCorrelator — maps request ids to per-request event queues.
//!
//! Each in-flight HTTP request owns exactly one `PendingRequest`. The
//! correlator routes inbound events into the matching queue and is the
//! sole authority for removing entries. Removal is tied to the
//! `PendingRequest` drop guard, so it happens on every exit path of the
//! consuming stream: terminal event, idle timeout, or caller disconnect.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

use bridge_protocol::RelayEvent;

/// Process-wide id → queue mapping. Queues are unbounded; a request that
/// never sees a terminal event is bounded in practice by the relay's idle
/// timeout, not by queue depth.
pub struct RequestCorrelator {
    pending: DashMap<String, mpsc::UnboundedSender<RelayEvent>>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Allocate a fresh request id and its event queue.
    ///
    /// Must be called before the corresponding broadcast so that replies
    /// arriving immediately after the broadcast are routable.
    pub fn create_pending(self: &Arc<Self>) -> PendingRequest {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending.insert(id.clone(), tx);
        PendingRequest {
            id,
            receiver: rx,
            correlator: Arc::clone(self),
        }
    }

    /// Enqueue `event` onto the queue for `id`, if it still exists.
    ///
    /// Unknown or already-removed ids are expected under timeout and
    /// disconnect races; those events are discarded without error.
    pub fn route(&self, id: &str, event: RelayEvent) {
        match self.pending.get(id) {
            Some(tx) => {
                // Send only fails if the consumer is mid-teardown; the
                // event is moot either way.
                let _ = tx.send(event);
            }
            None => trace!(request_id = %id, "Dropping event for unknown request"),
        }
    }

    /// Delete the mapping for `id`. Idempotent.
    pub fn remove(&self, id: &str) {
        self.pending.remove(id);
    }

    /// Whether `id` currently has a queue.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

/// One in-flight request: its id and the consuming end of its queue.
///
/// Dropping this guard removes the correlator entry, after which late
/// events for the id are silently discarded.
pub struct PendingRequest {
    id: String,
    receiver: mpsc::UnboundedReceiver<RelayEvent>,
    correlator: Arc<RequestCorrelator>,
}

impl PendingRequest {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Receive the next event, in dispatcher arrival order.
    pub async fn recv(&mut self) -> Option<RelayEvent> {
        self.receiver.recv().await
    }

    /// Non-blocking receive; `None` when the queue is currently empty.
    pub fn try_recv(&mut self) -> Option<RelayEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.correlator.remove(&self.id);
    }
}
