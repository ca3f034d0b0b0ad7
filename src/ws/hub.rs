//! Outbound delivery to connected clients
//!
//! Every connection owns one FIFO queue drained by its socket writer task, so
//! targeted sends and broadcasts reach each client in the order they were issued.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use super::protocol::{ConnectionId, ServerMsg};

/// Reliable, ordered delivery the match coordinator sends through
pub trait Outbound: Send + Sync {
    /// Deliver to a single connection; unknown connections are skipped
    fn send_to(&self, connection_id: ConnectionId, msg: ServerMsg);

    /// Deliver to every live connection
    fn broadcast(&self, msg: ServerMsg);
}

/// Registry of live socket writer queues
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<ServerMsg>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection and hand back the queue its writer drains
    pub fn register(&self, connection_id: ConnectionId) -> mpsc::UnboundedReceiver<ServerMsg> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(connection_id, tx);
        rx
    }

    pub fn unregister(&self, connection_id: ConnectionId) {
        self.connections.remove(&connection_id);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbound for ConnectionHub {
    fn send_to(&self, connection_id: ConnectionId, msg: ServerMsg) {
        match self.connections.get(&connection_id) {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    debug!(connection_id = %connection_id, "Writer gone, dropping message");
                }
            }
            None => debug!(connection_id = %connection_id, "No such connection, dropping message"),
        }
    }

    fn broadcast(&self, msg: ServerMsg) {
        for entry in self.connections.iter() {
            if entry.value().send(msg.clone()).is_err() {
                debug!(connection_id = %entry.key(), "Writer gone, dropping broadcast");
            }
        }
    }
}
