//! Prompt Bridge - Transport Layer
//!
//! Axum HTTP + WebSocket wiring around the relay core:
//! - `GET /ws` — upgrade for browser bridge clients (register, forward
//!   broadcasts, dispatch inbound frames, unregister on close)
//! - `POST /send` — prompt intake returning the NDJSON event stream
//! - `GET /health` — connected client count and uptime
//!
//! The transport owns the sockets and nothing else; all correlation state
//! lives in `bridge-core`.

pub mod server;

pub use server::{TransportConfig, TransportServer};
