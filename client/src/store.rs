//! The client game store.
//!
//! Holds the active session, exactly one per-game state machine for it, and
//! the pending invites. Every state change, local or remote, goes through
//! here. Packets that must go out as a consequence of inbound traffic are
//! queued in an outbox that the composition root flushes to the transport.

use log::{debug, info, warn};
use shared::{GameKind, Invite, Move, MoveAction, Packet, Player, PresenceStatus};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::games::memory::Resolution;
use crate::games::word_scramble::GuessOutcome;
use crate::games::{MemoryMatch, MoveRejection, Quiz, TicTacToe, WordScramble};
use crate::invite::InviteBook;
use crate::session::{Role, Session, SessionStatus};

/// The state machine of the game being played.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveGame {
    TicTacToe(TicTacToe),
    Memory(MemoryMatch),
    Quiz(Quiz),
    WordScramble(WordScramble),
}

impl ActiveGame {
    pub fn fresh(kind: GameKind, seed: u64) -> Self {
        match kind {
            GameKind::TicTacToe => ActiveGame::TicTacToe(TicTacToe::new()),
            GameKind::Memory => ActiveGame::Memory(MemoryMatch::new(seed)),
            GameKind::Quiz => ActiveGame::Quiz(Quiz::new()),
            GameKind::WordScramble => ActiveGame::WordScramble(WordScramble::new(seed)),
        }
    }

    pub fn kind(&self) -> GameKind {
        match self {
            ActiveGame::TicTacToe(_) => GameKind::TicTacToe,
            ActiveGame::Memory(_) => GameKind::Memory,
            ActiveGame::Quiz(_) => GameKind::Quiz,
            ActiveGame::WordScramble(_) => GameKind::WordScramble,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ActiveGame::TicTacToe(board) => board.is_terminal(),
            ActiveGame::Memory(memory) => memory.is_complete(),
            ActiveGame::Quiz(quiz) => quiz.is_finished(),
            ActiveGame::WordScramble(words) => words.is_finished(),
        }
    }
}

/// What happened to an inbound move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    Applied,
    /// Not for the local session; discarded.
    ForeignSession,
    /// Already applied under this id.
    Duplicate,
    /// The session is pending or abandoned.
    NotActive,
    WrongGame,
    /// Valid move that changes nothing, e.g. a repeated quiz answer.
    Ignored,
    Rejected(MoveRejection),
}

/// A transition caused by time passing rather than input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    PairResolved(Resolution),
    QuestionExpired { count: usize },
    TimeUp,
}

pub struct GameStore {
    local: Player,
    session: Option<Session>,
    game: Option<ActiveGame>,
    invites: InviteBook,
    applied_moves: HashSet<Uuid>,
    outbox: Vec<Packet>,
}

impl GameStore {
    pub fn new(local: Player) -> Self {
        Self {
            local,
            session: None,
            game: None,
            invites: InviteBook::new(),
            applied_moves: HashSet::new(),
            outbox: Vec::new(),
        }
    }

    pub fn local(&self) -> &Player {
        &self.local
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn game(&self) -> Option<&ActiveGame> {
        self.game.as_ref()
    }

    pub fn invites(&self) -> &InviteBook {
        &self.invites
    }

    /// `InGame` while a match is pending or running.
    pub fn presence_status(&self) -> PresenceStatus {
        match &self.session {
            Some(session) if !session.is_over() => PresenceStatus::InGame,
            _ => PresenceStatus::Online,
        }
    }

    pub fn take_outbox(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbox)
    }

    /// Starts a match directly, with the local player as inviter.
    pub fn start_game(&mut self, game: GameKind, opponent: Player) -> Uuid {
        let session = Session::new(Uuid::new_v4(), game, opponent, Role::Inviter, rand::random());
        self.begin(session)
    }

    fn begin(&mut self, session: Session) -> Uuid {
        if let Some(previous) = self.session.take() {
            debug!("Replacing session {}", previous.id);
            self.notify_closed(&previous);
        }
        info!(
            "Session {} ({}) against {} [{:?}]",
            session.id, session.game, session.opponent.username, session.status
        );

        let id = session.id;
        self.applied_moves.clear();
        self.game = Some(ActiveGame::fresh(session.game, session.seed));
        self.session = Some(session);
        id
    }

    /// Leaves the current match and tells the opponent if it was still running.
    pub fn end_game(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        info!("Leaving session {} ({:?})", session.id, session.status);

        self.notify_closed(&session);
        self.game = None;
        self.applied_moves.clear();
    }

    /// Tells the opponent of a session we are leaving, unless they left first.
    fn notify_closed(&mut self, session: &Session) {
        if session.status != SessionStatus::Abandoned {
            self.outbox.push(Packet::SessionClosed {
                to: session.opponent.id.clone(),
                session_id: session.id,
            });
        }
    }

    pub fn update_tictactoe_state(&mut self, state: TicTacToe) -> Result<(), StoreError> {
        self.replace_state(ActiveGame::TicTacToe(state))
    }

    pub fn update_memory_state(&mut self, state: MemoryMatch) -> Result<(), StoreError> {
        self.replace_state(ActiveGame::Memory(state))
    }

    pub fn update_quiz_state(&mut self, state: Quiz) -> Result<(), StoreError> {
        self.replace_state(ActiveGame::Quiz(state))
    }

    pub fn update_word_scramble_state(&mut self, state: WordScramble) -> Result<(), StoreError> {
        self.replace_state(ActiveGame::WordScramble(state))
    }

    fn replace_state(&mut self, state: ActiveGame) -> Result<(), StoreError> {
        let session = self.session.as_ref().ok_or(StoreError::NoSession)?;
        if session.game != state.kind() {
            return Err(StoreError::WrongGame);
        }
        self.game = Some(state);
        self.refresh_completion();
        Ok(())
    }

    // Invites

    pub fn send_invite(&mut self, opponent: Player, game: GameKind) -> Invite {
        let invite = Invite::new(self.local.clone(), opponent, game, rand::random());
        info!(
            "Inviting {} to {} ({})",
            invite.to.username, invite.game, invite.id
        );
        self.invites.record_sent(invite.clone());
        self.outbox.push(Packet::Invite(invite.clone()));
        invite
    }

    pub fn receive_invite(&mut self, invite: Invite) -> bool {
        if invite.to.id != self.local.id {
            debug!("Invite {} is addressed to {}", invite.id, invite.to.id);
            return false;
        }
        info!(
            "{} invites you to {} ({})",
            invite.from.username, invite.game, invite.id
        );
        self.invites.record_received(invite)
    }

    /// Accepts a received invite and opens a pending session for it.
    pub fn accept_invite(&mut self, invite_id: &Uuid) -> Option<Uuid> {
        let Some(invite) = self.invites.accept(invite_id) else {
            debug!("No pending invite {}", invite_id);
            return None;
        };

        let session = Session::new(
            Uuid::new_v4(),
            invite.game,
            invite.from.clone(),
            Role::Invitee,
            invite.seed,
        )
        .pending()
        .with_invite(invite.id);
        let session_id = self.begin(session);

        self.outbox.push(Packet::InviteAccepted {
            to: invite.from.id,
            invite_id: invite.id,
            session_id,
            from: self.local.clone(),
        });
        Some(session_id)
    }

    pub fn reject_invite(&mut self, invite_id: &Uuid) -> bool {
        let Some(invite) = self.invites.reject(invite_id) else {
            debug!("No pending invite {}", invite_id);
            return false;
        };
        info!("Rejected invite {} from {}", invite.id, invite.from.username);

        self.outbox.push(Packet::InviteRejected {
            to: invite.from.id,
            invite_id: invite.id,
            from: self.local.id.clone(),
        });
        true
    }

    /// The invitee agreed; start the match and confirm its id.
    pub fn handle_invite_accepted(
        &mut self,
        invite_id: &Uuid,
        session_id: Uuid,
        from: Player,
    ) -> bool {
        let Some(invite) = self.invites.take_sent(invite_id, true) else {
            debug!("Ignoring acceptance of unknown invite {}", invite_id);
            return false;
        };
        if invite.to.id != from.id {
            warn!("Invite {} accepted by {} instead of {}", invite_id, from.id, invite.to.id);
        }

        let to = from.id.clone();
        let session = Session::new(session_id, invite.game, from, Role::Inviter, invite.seed)
            .with_invite(invite.id);
        self.begin(session);

        self.outbox.push(Packet::SessionConfirmed {
            to,
            invite_id: invite.id,
            session_id,
        });
        true
    }

    pub fn handle_invite_rejected(&mut self, invite_id: &Uuid) -> bool {
        match self.invites.take_sent(invite_id, false) {
            Some(invite) => {
                info!("{} declined your {} invite", invite.to.username, invite.game);
                true
            }
            None => false,
        }
    }

    pub fn handle_session_confirmed(&mut self, invite_id: &Uuid, session_id: &Uuid) -> bool {
        match self.session.as_mut() {
            Some(session)
                if session.is_pending()
                    && session.id == *session_id
                    && session.invite_id.as_ref() == Some(invite_id) =>
            {
                session.status = SessionStatus::Active;
                info!("Session {} confirmed", session_id);
                true
            }
            _ => {
                debug!("Ignoring confirmation of session {}", session_id);
                false
            }
        }
    }

    pub fn handle_session_closed(&mut self, session_id: &Uuid) -> bool {
        self.abandon_if(|session| session.id == *session_id, "opponent left")
    }

    /// Reacts to a roster push: invites and a running match against players
    /// who are gone are dropped.
    pub fn handle_roster(&mut self, players: &[Player]) {
        let present = |id: &str| players.iter().any(|p| p.id == id);

        let departed: HashSet<String> = self
            .invites
            .sent()
            .into_iter()
            .map(|invite| invite.to.id.clone())
            .chain(
                self.invites
                    .received()
                    .into_iter()
                    .map(|invite| invite.from.id.clone()),
            )
            .filter(|id| !present(id))
            .collect();
        for player_id in departed {
            self.invites.withdraw_player(&player_id);
        }

        self.abandon_if(|session| !present(&session.opponent.id), "opponent disconnected");
    }

    fn abandon_if(&mut self, condition: impl Fn(&Session) -> bool, reason: &str) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.is_over() || !condition(session) {
            return false;
        }

        session.status = SessionStatus::Abandoned;
        info!("Session {} abandoned: {}", session.id, reason);
        true
    }

    // Local input

    pub fn place_mark(&mut self, position: usize) -> Result<Move, StoreError> {
        let mark = self.playable()?.role.mark();
        let board = match self.game.as_mut() {
            Some(ActiveGame::TicTacToe(board)) => board,
            _ => return Err(StoreError::WrongGame),
        };
        board.play_local(position, mark)?;

        Ok(self.emit(MoveAction::TicTacToe {
            position: position as u8,
            mark,
        }))
    }

    pub fn flip_card(&mut self, card_id: u8) -> Result<Move, StoreError> {
        self.playable()?;
        let memory = match self.game.as_mut() {
            Some(ActiveGame::Memory(memory)) => memory,
            _ => return Err(StoreError::WrongGame),
        };
        memory.flip(card_id)?;

        Ok(self.emit(MoveAction::Memory { card_id }))
    }

    pub fn answer_question(&mut self, answer: &str) -> Result<Move, StoreError> {
        self.playable()?;
        let quiz = match self.game.as_mut() {
            Some(ActiveGame::Quiz(quiz)) => quiz,
            _ => return Err(StoreError::WrongGame),
        };
        let outcome = quiz.answer(answer)?;

        Ok(self.emit(MoveAction::Quiz {
            question: outcome.question,
            answer: answer.to_string(),
        }))
    }

    /// Only a correct guess produces a move.
    pub fn guess_word(&mut self, guess: &str) -> Result<Option<Move>, StoreError> {
        self.playable()?;
        let words = match self.game.as_mut() {
            Some(ActiveGame::WordScramble(words)) => words,
            _ => return Err(StoreError::WrongGame),
        };

        match words.guess(guess)? {
            GuessOutcome::Correct { word } => {
                Ok(Some(self.emit(MoveAction::WordScramble { guess: word })))
            }
            GuessOutcome::Incorrect => Ok(None),
        }
    }

    fn playable(&self) -> Result<&Session, StoreError> {
        let session = self.session.as_ref().ok_or(StoreError::NoSession)?;
        match session.status {
            SessionStatus::Pending => Err(StoreError::SessionPending),
            SessionStatus::Active => Ok(session),
            SessionStatus::Completed => Err(StoreError::Rejected(MoveRejection::GameOver)),
            SessionStatus::Abandoned => Err(StoreError::NoSession),
        }
    }

    /// Wraps an applied local action into a move and queues it for sending.
    fn emit(&mut self, action: MoveAction) -> Move {
        let session_id = self.session.as_ref().map(|s| s.id).unwrap_or_default();
        let mv = Move::new(session_id, self.local.id.clone(), action);

        self.applied_moves.insert(mv.id);
        self.outbox.push(Packet::Move(mv.clone()));
        self.refresh_completion();
        mv
    }

    // Remote input

    pub fn apply_remote(&mut self, mv: &Move) -> RemoteOutcome {
        let Some(session) = self.session.as_ref() else {
            return RemoteOutcome::ForeignSession;
        };
        if session.id != mv.session_id || session.opponent.id != mv.player_id {
            debug!("Discarding move {} for session {}", mv.id, mv.session_id);
            return RemoteOutcome::ForeignSession;
        }
        if self.applied_moves.contains(&mv.id) {
            debug!("Move {} already applied", mv.id);
            return RemoteOutcome::Duplicate;
        }
        if !session.accepts_moves() {
            debug!("Session {} is {:?}; move {} dropped", session.id, session.status, mv.id);
            return RemoteOutcome::NotActive;
        }
        self.applied_moves.insert(mv.id);

        let Some(game) = self.game.as_mut() else {
            return RemoteOutcome::NotActive;
        };
        let outcome = match (game, &mv.action) {
            (ActiveGame::TicTacToe(board), MoveAction::TicTacToe { position, mark }) => {
                match board.apply_remote(usize::from(*position), *mark) {
                    Ok(_) => RemoteOutcome::Applied,
                    Err(rejection) => RemoteOutcome::Rejected(rejection),
                }
            }
            (ActiveGame::Memory(memory), MoveAction::Memory { card_id }) => {
                match memory.apply_remote(*card_id) {
                    Ok(_) => RemoteOutcome::Applied,
                    Err(rejection) => RemoteOutcome::Rejected(rejection),
                }
            }
            (ActiveGame::Quiz(quiz), MoveAction::Quiz { question, answer }) => {
                if quiz.apply_remote(*question, answer) {
                    RemoteOutcome::Applied
                } else {
                    RemoteOutcome::Ignored
                }
            }
            (ActiveGame::WordScramble(words), MoveAction::WordScramble { guess }) => {
                if words.apply_remote(guess) {
                    RemoteOutcome::Applied
                } else {
                    RemoteOutcome::Ignored
                }
            }
            _ => RemoteOutcome::WrongGame,
        };

        match outcome {
            RemoteOutcome::Applied => self.refresh_completion(),
            other => debug!("Remote move {} not applied: {:?}", mv.id, other),
        }
        outcome
    }

    // Time

    pub fn advance(&mut self, elapsed: Duration) -> Option<TimerEvent> {
        if self.session.as_ref()?.status != SessionStatus::Active {
            return None;
        }

        let event = match self.game.as_mut()? {
            ActiveGame::TicTacToe(_) => None,
            ActiveGame::Memory(memory) => memory.advance(elapsed).map(TimerEvent::PairResolved),
            ActiveGame::Quiz(quiz) => match quiz.advance(elapsed) {
                0 => None,
                count => Some(TimerEvent::QuestionExpired { count }),
            },
            ActiveGame::WordScramble(words) => {
                words.advance(elapsed).then_some(TimerEvent::TimeUp)
            }
        };

        if event.is_some() {
            self.refresh_completion();
        }
        event
    }

    fn refresh_completion(&mut self) {
        let (Some(session), Some(game)) = (self.session.as_mut(), self.game.as_ref()) else {
            return;
        };
        if session.status != SessionStatus::Active || !game.is_terminal() {
            return;
        }

        session.status = SessionStatus::Completed;
        if let ActiveGame::TicTacToe(board) = game {
            session.winner = board.winner().map(|mark| {
                if mark == session.role.mark() {
                    self.local.id.clone()
                } else {
                    session.opponent.id.clone()
                }
            });
        }
        info!(
            "Session {} completed{}",
            session.id,
            session
                .winner
                .as_ref()
                .map(|w| format!(", winner {}", w))
                .unwrap_or_default()
        );
    }
}
