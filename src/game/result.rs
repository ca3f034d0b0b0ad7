//! Final match result and its platform payload

use serde::Serialize;

use crate::ws::protocol::ConnectionId;

use super::registry::{ConnectionRegistry, Role};

/// Computed once when the ball leaves the field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub winner_connection_id: ConnectionId,
    pub loser_connection_id: ConnectionId,
    pub winner_user_id: String,
    pub loser_user_id: String,
}

#[derive(Debug, Serialize)]
struct ResultBody<'a> {
    winner: ConnectionId,
    winner_uid: &'a str,
    loser_uid: &'a str,
}

#[derive(Debug, Serialize)]
struct ResultPayload<'a> {
    result: ResultBody<'a>,
}

impl MatchResult {
    /// Build the result from the seats; `None` unless both seats are filled
    pub fn for_winner(registry: &ConnectionRegistry, winner: Role) -> Option<Self> {
        let loser = match winner {
            Role::Host => Role::Guest,
            Role::Guest => Role::Host,
        };
        let winner = registry.seat(winner)?;
        let loser = registry.seat(loser)?;

        Some(Self {
            winner_connection_id: winner.connection_id,
            loser_connection_id: loser.connection_id,
            winner_user_id: winner.user_id.clone(),
            loser_user_id: loser.user_id.clone(),
        })
    }

    /// `{"result": {"winner": .., "winner_uid": .., "loser_uid": ..}}`
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&ResultPayload {
            result: ResultBody {
                winner: self.winner_connection_id,
                winner_uid: &self.winner_user_id,
                loser_uid: &self.loser_user_id,
            },
        })
    }
}
