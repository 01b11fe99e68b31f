//! Prompt Bridge - Relay Core
//!
//! The request-correlation and streaming-relay engine:
//! - `ConnectionRegistry` — the set of connected bridge clients, with
//!   best-effort broadcast.
//! - `RequestCorrelator` — request id → event queue mapping, with
//!   drop-guarded cleanup.
//! - `dispatcher` — translates raw inbound frames into routed events.
//! - `StreamRelay` — per-request orchestrator producing the finite,
//!   timeout-bounded NDJSON event stream.
//!
//! The core holds no transport state. Both registries are explicitly
//! constructed (empty on startup) and passed by `Arc` to whatever owns
//! the sockets.

pub mod correlator;
pub mod dispatcher;
pub mod registry;
pub mod relay;

pub use correlator::{PendingRequest, RequestCorrelator};
pub use dispatcher::dispatch_frame;
pub use registry::ConnectionRegistry;
pub use relay::StreamRelay;
