//! Match state: position models, connection registry and the coordinator

pub mod coordinator;
pub mod models;
pub mod registry;
pub mod result;

pub use coordinator::{MatchCoordinator, MatchOutcome, MatchPhase};
pub use registry::{ConnectionRegistry, Role};
pub use result::MatchResult;

use crate::ws::protocol::{ClientMsg, ConnectionId};

/// Event delivered from the socket layer to the match task
#[derive(Debug, Clone)]
pub enum MatchInput {
    Connected {
        connection_id: ConnectionId,
        nickname: String,
    },
    Message {
        connection_id: ConnectionId,
        msg: ClientMsg,
    },
    Disconnected {
        connection_id: ConnectionId,
    },
}
