//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-assigned identifier, stable for the lifetime of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Client finished local setup and presents its credentials
    Ready { user_id: String, token: String },

    /// Own bar position, sampled by the client
    BarPos {
        /// Client-claimed player id (the server relays its own id instead)
        player_id: u32,
        position_x: f32,
        timestamp: f32,
    },

    /// Ball state as simulated by the client
    BallPos {
        player_id: u32,
        position_x: f32,
        position_y: f32,
        velocity_x: f32,
        velocity_y: f32,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Private to one connection after it authenticated
    Start {
        player_id: ConnectionId,
        is_host: bool,
        /// Serve velocity, host only
        #[serde(skip_serializing_if = "Option::is_none", default)]
        ball_velocity_x: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        ball_velocity_y: Option<f32>,
    },

    /// Both players are seated and the match is live
    MatchStart,

    /// Match has ended
    MatchEnd { winner_id: ConnectionId },

    /// Opponent bar, already mirrored for the receiver
    SetOpponentBar {
        player_id: ConnectionId,
        position_x: f32,
        timestamp: f32,
    },

    /// Ball state, already mirrored for the receiver
    SetBallState {
        player_id: ConnectionId,
        position_x: f32,
        position_y: f32,
        velocity_x: f32,
        velocity_y: f32,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}
