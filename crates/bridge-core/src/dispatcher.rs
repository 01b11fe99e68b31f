//! Inbound frame dispatch — translates raw client frames into routed events.
//!
//! Stateless: each connection's read loop calls `dispatch_frame` per text
//! frame. Failures stay local — a malformed frame is logged and dropped,
//! never propagated into the read loop or to any HTTP caller.

use bridge_protocol::{InboundFrame, RelayEvent};
use tracing::{debug, warn};

use crate::correlator::RequestCorrelator;

/// Parse one raw text frame and route the resulting event, if any.
///
/// Translation table:
/// `response.text` → `Done`, `stream.chunk` → `Chunk`, `status.status` →
/// `Status`. Unrecognized types (including `ping` keepalives from the
/// browser extension) are ignored without side effects.
pub fn dispatch_frame(correlator: &RequestCorrelator, raw: &str) {
    let frame: InboundFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Ignoring unparseable inbound frame");
            return;
        }
    };

    let event = match frame.kind.as_str() {
        "response" => frame.text.map(RelayEvent::Done),
        "stream" => frame.chunk.map(RelayEvent::Chunk),
        "status" => frame.status.map(RelayEvent::Status),
        other => {
            debug!(kind = %other, "Ignoring inbound frame of unrecognized type");
            return;
        }
    };

    let Some(event) = event else {
        warn!(kind = %frame.kind, "Ignoring inbound frame missing its payload field");
        return;
    };

    let Some(request_id) = frame.request_id else {
        warn!(kind = %frame.kind, "Ignoring inbound frame missing requestId");
        return;
    };

    correlator.route(&request_id, event);
}
