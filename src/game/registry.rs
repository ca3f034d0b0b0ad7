//! Connection registry: per-connection player records and role seats

use std::collections::BTreeMap;

use crate::platform::AuthProvider;
use crate::ws::protocol::ConnectionId;

use super::models::Bar;

/// Seat a player holds for the match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Simulates the ball and chooses the serve
    Host,
    Guest,
}

impl Role {
    pub fn opponent(self) -> Role {
        match self {
            Role::Host => Role::Guest,
            Role::Guest => Role::Host,
        }
    }
}

/// Credentials accepted for a player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    pub token: String,
}

/// Player record, alive from connect until disconnect or release
#[derive(Debug, Clone)]
pub struct Player {
    pub connection_id: ConnectionId,
    /// Join-order ordinal
    pub slot: u32,
    pub nickname: String,
    pub credentials: Option<Credentials>,
    pub role: Option<Role>,
    pub bar: Bar,
}

impl Player {
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.user_id.as_str())
    }
}

/// A filled role; outlives the player record so results can still name a
/// player who disconnected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub connection_id: ConnectionId,
    pub user_id: String,
}

pub struct ConnectionRegistry {
    players: BTreeMap<ConnectionId, Player>,
    next_slot: u32,
    host: Option<Seat>,
    guest: Option<Seat>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            players: BTreeMap::new(),
            next_slot: 0,
            host: None,
            guest: None,
        }
    }

    /// Insert an unauthenticated player; returns its join-order slot
    pub fn add_player(
        &mut self,
        connection_id: ConnectionId,
        nickname: &str,
    ) -> Result<u32, RegistryError> {
        if self.players.contains_key(&connection_id) {
            return Err(RegistryError::DuplicateConnection(connection_id));
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        self.players.insert(
            connection_id,
            Player {
                connection_id,
                slot,
                nickname: nickname.to_string(),
                credentials: None,
                role: None,
                bar: Bar::default(),
            },
        );
        Ok(slot)
    }

    /// Check credentials with `auth`; only a successful check touches the record
    pub fn authenticate(
        &mut self,
        connection_id: ConnectionId,
        user_id: &str,
        token: &str,
        auth: &dyn AuthProvider,
    ) -> bool {
        let Some(player) = self.players.get_mut(&connection_id) else {
            return false;
        };

        if !auth.auth_user(user_id, token) {
            return false;
        }

        player.credentials = Some(Credentials {
            user_id: user_id.to_string(),
            token: token.to_string(),
        });
        true
    }

    /// First authenticated connection gets host, the next guest.
    /// A connection that already holds a seat keeps it.
    pub fn assign_role(&mut self, connection_id: ConnectionId) -> Result<Role, RegistryError> {
        let player = self
            .players
            .get_mut(&connection_id)
            .ok_or(RegistryError::UnknownConnection(connection_id))?;

        if let Some(role) = player.role {
            return Ok(role);
        }

        let user_id = player
            .user_id()
            .ok_or(RegistryError::NotAuthenticated(connection_id))?
            .to_string();
        let seat = Seat {
            connection_id,
            user_id,
        };

        let role = if self.host.is_none() {
            self.host = Some(seat);
            Role::Host
        } else if self.guest.is_none() {
            self.guest = Some(seat);
            Role::Guest
        } else {
            return Err(RegistryError::RoleSlotsFull);
        };

        player.role = Some(role);
        Ok(role)
    }

    /// Removing an absent connection is a no-op
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Player> {
        self.players.remove(&connection_id)
    }

    pub fn find(&self, connection_id: ConnectionId) -> Option<&Player> {
        self.players.get(&connection_id)
    }

    pub fn find_mut(&mut self, connection_id: ConnectionId) -> Option<&mut Player> {
        self.players.get_mut(&connection_id)
    }

    /// The still-connected player in the seat opposite `connection_id`.
    /// `None` when the sender holds no seat or the opponent is gone.
    pub fn opponent(&self, connection_id: ConnectionId) -> Option<&Player> {
        let role = self.find(connection_id)?.role?;
        let seat = self.seat(role.opponent())?;
        self.find(seat.connection_id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn host(&self) -> Option<&Seat> {
        self.host.as_ref()
    }

    pub fn guest(&self) -> Option<&Seat> {
        self.guest.as_ref()
    }

    pub fn seat(&self, role: Role) -> Option<&Seat> {
        match role {
            Role::Host => self.host(),
            Role::Guest => self.guest(),
        }
    }

    pub fn seats_filled(&self) -> bool {
        self.host.is_some() && self.guest.is_some()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Drop every player and seat
    pub fn clear(&mut self) {
        self.players.clear();
        self.host = None;
        self.guest = None;
        self.next_slot = 0;
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Connection {0} is already registered")]
    DuplicateConnection(ConnectionId),

    #[error("Connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("Connection {0} has not authenticated")]
    NotAuthenticated(ConnectionId),

    #[error("Host and guest seats are both taken")]
    RoleSlotsFull,
}
