//! StreamRelay — per-request orchestrator.
//!
//! `handle` allocates a request id and queue, broadcasts the prompt command
//! to every connected client, and returns a lazy finite stream of output
//! records: an immediate `status "Request queued"` acknowledgement, then
//! queue events until a terminal `done` arrives or the idle window expires.
//!
//! The idle timeout is per received event, not total elapsed time: a client
//! that keeps streaming chunks keeps the request alive indefinitely.
//!
//! Cleanup needs no explicit bookkeeping here — the `PendingRequest` guard
//! travels inside the stream's state, so dropping the stream (terminal
//! event, timeout, or the HTTP caller going away mid-stream) removes the
//! correlator entry.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream};
use tracing::{debug, info};

use bridge_protocol::{OutboundCommand, RelayError, StreamRecord};

use crate::correlator::{PendingRequest, RequestCorrelator};
use crate::registry::ConnectionRegistry;

/// Default idle window between events before a request is abandoned.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

const QUEUED_MESSAGE: &str = "Request queued";
const TIMEOUT_MESSAGE: &str = "Timeout waiting for AI response";

/// Relay stream state machine, advanced once per emitted record.
enum RelayState {
    Queued(PendingRequest),
    Draining(PendingRequest),
    Finished,
}

#[derive(Clone)]
pub struct StreamRelay {
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<RequestCorrelator>,
    idle_timeout: Duration,
}

impl StreamRelay {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        correlator: Arc<RequestCorrelator>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            correlator,
            idle_timeout,
        }
    }

    /// Broadcast a prompt and return the finite stream of output records.
    ///
    /// Fails fast with `NoClientsConnected` when the registry is empty —
    /// in that case no request id is allocated and nothing is broadcast.
    pub fn handle(
        &self,
        model: &str,
        prompt: &str,
        new_chat: bool,
    ) -> Result<impl Stream<Item = StreamRecord> + Send + 'static, RelayError> {
        if self.registry.is_empty() {
            return Err(RelayError::NoClientsConnected);
        }

        // Queue first, broadcast second: a reply racing the broadcast must
        // already be routable.
        let pending = self.correlator.create_pending();
        let command = OutboundCommand::send_prompt(pending.id(), model, prompt, new_chat);
        let frame = serde_json::to_string(&command).unwrap();

        info!(
            request_id = %pending.id(),
            model = %model,
            clients = self.registry.client_count(),
            "Broadcasting prompt"
        );
        self.registry.broadcast(&frame);

        let idle_timeout = self.idle_timeout;
        Ok(stream::unfold(
            RelayState::Queued(pending),
            move |state| async move {
                match state {
                    RelayState::Queued(pending) => Some((
                        StreamRecord::Status {
                            text: QUEUED_MESSAGE.into(),
                        },
                        RelayState::Draining(pending),
                    )),
                    RelayState::Draining(mut pending) => {
                        match tokio::time::timeout(idle_timeout, pending.recv()).await {
                            Ok(Some(event)) => {
                                let next = if event.is_terminal() {
                                    RelayState::Finished
                                } else {
                                    RelayState::Draining(pending)
                                };
                                Some((StreamRecord::from(event), next))
                            }
                            // Queue closed from outside the relay; treat it
                            // like an idle timeout rather than ending the
                            // NDJSON body without a terminal line.
                            Ok(None) | Err(_) => {
                                debug!(request_id = %pending.id(), "Request timed out");
                                Some((
                                    StreamRecord::Error {
                                        text: TIMEOUT_MESSAGE.into(),
                                    },
                                    RelayState::Finished,
                                ))
                            }
                        }
                    }
                    RelayState::Finished => None,
                }
            },
        ))
    }
}
