//! Application state shared across routes

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::Config;
use crate::game::{MatchInput, MatchPhase};
use crate::ws::hub::ConnectionHub;
use crate::ws::protocol::ConnectionId;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<ConnectionHub>,
    /// Inbound events for the match task
    pub match_tx: mpsc::UnboundedSender<MatchInput>,
    pub phase: watch::Receiver<MatchPhase>,
    next_connection_id: Arc<AtomicU32>,
}

impl AppState {
    pub fn new(
        config: Config,
        hub: Arc<ConnectionHub>,
        match_tx: mpsc::UnboundedSender<MatchInput>,
        phase: watch::Receiver<MatchPhase>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            hub,
            match_tx,
            phase,
            next_connection_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Connection ids are never reused within the process
    pub fn allocate_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }
}
