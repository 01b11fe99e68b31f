//! Frame and record types for both sides of the bridge.
//!
//! Three encodings meet here:
//! - `OutboundCommand` — server → browser client, one JSON object per
//!   WebSocket text frame, camelCase field names.
//! - `InboundFrame` — browser client → server, one JSON object per frame.
//!   Parsed leniently: every payload field is optional and validated by the
//!   dispatcher, so a bad frame never kills a connection.
//! - `StreamRecord` — server → HTTP caller, one JSON object per NDJSON line.

use serde::{Deserialize, Serialize};

/// Body of `POST /send`.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub new_chat: bool,
}

/// Command broadcast to every connected bridge client.
///
/// Immutable once constructed; the same serialized frame goes to all clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundCommand {
    pub action: String,
    pub request_id: String,
    pub model: String,
    pub text: String,
    pub new_chat: bool,
}

impl OutboundCommand {
    /// The only action the bridge currently issues.
    pub const SEND_PROMPT: &str = "sendPrompt";

    pub fn send_prompt(
        request_id: impl Into<String>,
        model: impl Into<String>,
        text: impl Into<String>,
        new_chat: bool,
    ) -> Self {
        Self {
            action: Self::SEND_PROMPT.into(),
            request_id: request_id.into(),
            model: model.into(),
            text: text.into(),
            new_chat,
        }
    }
}

/// One raw frame received from a bridge client.
///
/// `kind` is the only required field. Which payload field must be present
/// depends on `kind`; the dispatcher enforces that per the translation table
/// (`response` → `text`, `stream` → `chunk`, `status` → `status`).
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "requestId")]
    pub request_id: Option<String>,
    pub text: Option<String>,
    pub chunk: Option<String>,
    pub status: Option<String>,
}

/// Typed event routed through the correlator into a request's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Status(String),
    Chunk(String),
    Done(String),
    Error(String),
}

impl RelayEvent {
    /// Terminal events end a request's output sequence and trigger cleanup.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error(_))
    }
}

/// One line of the NDJSON response body streamed to the HTTP caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamRecord {
    Status { text: String },
    Chunk { text: String },
    Done { text: String },
    Error { text: String },
}

impl StreamRecord {
    /// Serialize as one newline-terminated NDJSON line.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap();
        line.push('\n');
        line
    }
}

impl From<RelayEvent> for StreamRecord {
    fn from(event: RelayEvent) -> Self {
        match event {
            RelayEvent::Status(text) => Self::Status { text },
            RelayEvent::Chunk(text) => Self::Chunk { text },
            RelayEvent::Done(text) => Self::Done { text },
            RelayEvent::Error(text) => Self::Error { text },
        }
    }
}
