use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_DATAGRAM_SIZE: usize = 4096;

pub type PlayerId = String;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode packet: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode packet: {0}")]
    Decode(#[source] bincode::Error),
    #[error("packet of {0} bytes exceeds the datagram limit")]
    TooLarge(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown game type `{0}`")]
pub struct UnknownGame(pub String);

/// The four mini-games. Doubles as the `moveType` of a [`Move`].
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameKind {
    TicTacToe,
    Memory,
    Quiz,
    WordScramble,
}

impl GameKind {
    pub const ALL: [GameKind; 4] = [
        GameKind::TicTacToe,
        GameKind::Memory,
        GameKind::Quiz,
        GameKind::WordScramble,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::TicTacToe => "tictactoe",
            GameKind::Memory => "memory",
            GameKind::Quiz => "quiz",
            GameKind::WordScramble => "wordscramble",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameKind {
    type Err = UnknownGame;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        GameKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownGame(s.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Online,
    InGame,
    Offline,
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PresenceStatus::Online => "online",
            PresenceStatus::InGame => "in-game",
            PresenceStatus::Offline => "offline",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub status: PresenceStatus,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            status: PresenceStatus::Online,
        }
    }
}

/// A challenge from one player to another. `seed` drives every random choice
/// of the resulting match so both peers derive the same deck and word order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Invite {
    pub id: Uuid,
    pub from: Player,
    pub to: Player,
    pub game: GameKind,
    pub timestamp: u64,
    pub seed: u64,
}

impl Invite {
    pub fn new(from: Player, to: Player, game: GameKind, seed: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            to,
            game,
            timestamp: now_millis(),
            seed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    pub fn other(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => f.write_str("X"),
            Mark::O => f.write_str("O"),
        }
    }
}

/// The game-specific payload of a move.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum MoveAction {
    TicTacToe { position: u8, mark: Mark },
    Memory { card_id: u8 },
    Quiz { question: usize, answer: String },
    WordScramble { guess: String },
}

impl MoveAction {
    pub fn kind(&self) -> GameKind {
        match self {
            MoveAction::TicTacToe { .. } => GameKind::TicTacToe,
            MoveAction::Memory { .. } => GameKind::Memory,
            MoveAction::Quiz { .. } => GameKind::Quiz,
            MoveAction::WordScramble { .. } => GameKind::WordScramble,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Move {
    pub id: Uuid,
    pub session_id: Uuid,
    pub player_id: PlayerId,
    pub action: MoveAction,
    pub timestamp: u64,
}

impl Move {
    pub fn new(session_id: Uuid, player_id: impl Into<PlayerId>, action: MoveAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            player_id: player_id.into(),
            action,
            timestamp: now_millis(),
        }
    }

    pub fn kind(&self) -> GameKind {
        self.action.kind()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect {
        client_version: u32,
        player: Player,
    },
    Presence {
        player_id: PlayerId,
        status: PresenceStatus,
    },
    Heartbeat,
    Disconnect,

    Connected {
        connection_id: u32,
    },
    Roster {
        players: Vec<Player>,
    },
    Disconnected {
        reason: String,
    },

    Invite(Invite),
    InviteAccepted {
        to: PlayerId,
        invite_id: Uuid,
        session_id: Uuid,
        from: Player,
    },
    InviteRejected {
        to: PlayerId,
        invite_id: Uuid,
        from: PlayerId,
    },
    SessionConfirmed {
        to: PlayerId,
        invite_id: Uuid,
        session_id: Uuid,
    },
    SessionClosed {
        to: PlayerId,
        session_id: Uuid,
    },
    Move(Move),
}

/// Discriminant of a [`Packet`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Presence,
    Heartbeat,
    Disconnect,
    Connected,
    Roster,
    Disconnected,
    Invite,
    InviteAccepted,
    InviteRejected,
    SessionConfirmed,
    SessionClosed,
    Move,
}

impl Packet {
    pub fn kind(&self) -> EventKind {
        match self {
            Packet::Connect { .. } => EventKind::Connect,
            Packet::Presence { .. } => EventKind::Presence,
            Packet::Heartbeat => EventKind::Heartbeat,
            Packet::Disconnect => EventKind::Disconnect,
            Packet::Connected { .. } => EventKind::Connected,
            Packet::Roster { .. } => EventKind::Roster,
            Packet::Disconnected { .. } => EventKind::Disconnected,
            Packet::Invite(_) => EventKind::Invite,
            Packet::InviteAccepted { .. } => EventKind::InviteAccepted,
            Packet::InviteRejected { .. } => EventKind::InviteRejected,
            Packet::SessionConfirmed { .. } => EventKind::SessionConfirmed,
            Packet::SessionClosed { .. } => EventKind::SessionClosed,
            Packet::Move(_) => EventKind::Move,
        }
    }

    /// The single player this packet is addressed to, if it is not a broadcast.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Packet::Invite(invite) => Some(&invite.to.id),
            Packet::InviteAccepted { to, .. }
            | Packet::InviteRejected { to, .. }
            | Packet::SessionConfirmed { to, .. }
            | Packet::SessionClosed { to, .. } => Some(to),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = bincode::serialize(self).map_err(ProtocolError::Encode)?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        bincode::deserialize(bytes).map_err(ProtocolError::Decode)
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    (millis.min(u64::MAX as u128)) as u64
}
