//! ConnectionRegistry — the set of currently connected bridge clients.
//!
//! Clients are interchangeable broadcast targets with no identity beyond
//! their handle. Registration hands the registry an outbound frame sender;
//! the owning connection task drains the matching receiver into its socket.
//!
//! Uses parking_lot::RwLock (sync) so `is_empty()` and `broadcast()` can be
//! called from both sync and async contexts without holding a lock across
//! an await point.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One registered client: its outbound frame channel and when it connected.
struct ClientHandle {
    sender: mpsc::UnboundedSender<String>,
    connected_at: Instant,
}

/// Registry of connected bridge clients.
pub struct ConnectionRegistry {
    clients: RwLock<HashMap<String, ClientHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Add a client to the active set, returning its registry id.
    /// The client becomes a broadcast target immediately.
    pub fn register(&self, sender: mpsc::UnboundedSender<String>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.clients.write().insert(
            id.clone(),
            ClientHandle {
                sender,
                connected_at: Instant::now(),
            },
        );
        id
    }

    /// Remove a client. Idempotent — unregistering an absent id is a no-op.
    pub fn unregister(&self, id: &str) {
        if let Some(handle) = self.clients.write().remove(id) {
            debug!(
                client_id = %id,
                connected_secs = handle.connected_at.elapsed().as_secs(),
                "Client unregistered"
            );
        }
    }

    /// True when no client is connected. The intake path uses this to
    /// fail fast before allocating any per-request state.
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Send `frame` to every registered client, best-effort. A failed send
    /// to one client does not abort delivery to the others; clients whose
    /// channel has closed are unregistered afterwards.
    pub fn broadcast(&self, frame: &str) {
        let stale: Vec<String> = {
            let clients = self.clients.read();
            clients
                .iter()
                .filter(|(_, handle)| handle.sender.send(frame.to_string()).is_err())
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in stale {
            warn!(client_id = %id, "Broadcast failed, dropping client");
            self.unregister(&id);
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
