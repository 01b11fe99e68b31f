//! Relay error taxonomy.
//!
//! Only intake-time failures surface as Rust errors. Anything that happens
//! after the NDJSON stream has started (timeout, client vanishing) is
//! reported in-band as a terminal `StreamRecord::Error` line instead.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// No bridge client is connected, so a broadcast would go nowhere.
    /// Raised before any per-request state is allocated; the HTTP layer
    /// maps it to 503.
    #[error("no bridge client connected")]
    NoClientsConnected,
}
