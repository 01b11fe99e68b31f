//! Prompt Bridge - Protocol Types
//!
//! Wire types shared by the HTTP intake, the WebSocket transport, and the
//! relay core. This crate is the single source of truth for frame shapes,
//! output record shapes, and the relay error taxonomy.

pub mod error;
pub mod frames;

pub use error::RelayError;
pub use frames::{InboundFrame, OutboundCommand, PromptRequest, RelayEvent, StreamRecord};
