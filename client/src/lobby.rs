//! Presence announcements and the roster of other players.

use log::{debug, info};
use shared::{GameKind, Invite, Packet, Player, PlayerId, PresenceStatus};

use crate::errors::LobbyError;
use crate::store::GameStore;

/// Who the local user is. Must be known before anything is announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: PlayerId,
    pub username: String,
}

impl Identity {
    pub fn new(id: impl Into<PlayerId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }

    pub fn player(&self) -> Player {
        Player::new(self.id.clone(), self.username.clone())
    }
}

#[derive(Debug)]
pub struct Lobby {
    identity: Identity,
    status: PresenceStatus,
    roster: Vec<Player>,
}

impl Lobby {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            status: PresenceStatus::Offline,
            roster: Vec::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn status(&self) -> PresenceStatus {
        self.status
    }

    /// Records the local status and builds the packet announcing it.
    pub fn announce(&mut self, status: PresenceStatus) -> Packet {
        if self.status != status {
            info!("Presence: {} -> {}", self.status, status);
        }
        self.status = status;
        Packet::Presence {
            player_id: self.identity.id.clone(),
            status,
        }
    }

    /// The relay lists every fresh registration as online, whatever was
    /// announced over an earlier connection.
    pub fn registered(&mut self) {
        if self.status != PresenceStatus::Online {
            debug!("Relay sees us as {} again", PresenceStatus::Online);
        }
        self.status = PresenceStatus::Online;
    }

    /// Replaces the roster with everyone except the local player.
    pub fn apply_roster(&mut self, players: &[Player]) {
        self.roster = players
            .iter()
            .filter(|player| player.id != self.identity.id)
            .cloned()
            .collect();
        debug!("Roster now has {} other players", self.roster.len());
    }

    pub fn opponents(&self) -> &[Player] {
        &self.roster
    }

    pub fn find(&self, player_id: &str) -> Option<&Player> {
        self.roster.iter().find(|player| player.id == player_id)
    }

    /// Challenges an online opponent. The match starts only once the
    /// handshake completes.
    pub fn invite(
        &self,
        opponent_id: &str,
        game: GameKind,
        store: &mut GameStore,
    ) -> Result<Invite, LobbyError> {
        if opponent_id == self.identity.id {
            return Err(LobbyError::SelfInvite);
        }
        let opponent = self
            .find(opponent_id)
            .ok_or_else(|| LobbyError::UnknownPlayer(opponent_id.to_string()))?;
        if opponent.status != PresenceStatus::Online {
            return Err(LobbyError::Busy(opponent.username.clone()));
        }

        Ok(store.send_invite(opponent.clone(), game))
    }
}
