use shared::{now_millis, GameKind, Mark, Player, PlayerId};
use uuid::Uuid;

/// Which side of the invite the local player was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Inviter,
    Invitee,
}

impl Role {
    /// The inviter plays X and moves first.
    pub fn mark(self) -> Mark {
        match self {
            Role::Inviter => Mark::X,
            Role::Invitee => Mark::O,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Accepted locally, waiting for the inviter's confirmation.
    Pending,
    Active,
    Completed,
    Abandoned,
}

/// One match between the local player and an opponent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub invite_id: Option<Uuid>,
    pub game: GameKind,
    pub opponent: Player,
    pub role: Role,
    pub seed: u64,
    pub start_time: u64,
    pub status: SessionStatus,
    pub winner: Option<PlayerId>,
}

impl Session {
    pub fn new(id: Uuid, game: GameKind, opponent: Player, role: Role, seed: u64) -> Self {
        Self {
            id,
            invite_id: None,
            game,
            opponent,
            role,
            seed,
            start_time: now_millis(),
            status: SessionStatus::Active,
            winner: None,
        }
    }

    pub fn pending(mut self) -> Self {
        self.status = SessionStatus::Pending;
        self
    }

    pub fn with_invite(mut self, invite_id: Uuid) -> Self {
        self.invite_id = Some(invite_id);
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == SessionStatus::Pending
    }

    /// Moves are exchanged while active and accepted late after completion,
    /// so a final move that crosses the local finish still lands.
    pub fn accepts_moves(&self) -> bool {
        matches!(self.status, SessionStatus::Active | SessionStatus::Completed)
    }

    pub fn is_over(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Completed | SessionStatus::Abandoned
        )
    }
}
