use shared::ProtocolError;
use thiserror::Error;

use crate::games::MoveRejection;

/// Failures opening or using the transport.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid relay address: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("relay refused registration; retrying in {0:?}")]
    Refused(std::time::Duration),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LobbyError {
    #[error("no player `{0}` in the lobby")]
    UnknownPlayer(String),
    #[error("`{0}` is not available for a match")]
    Busy(String),
    #[error("you cannot invite yourself")]
    SelfInvite,
}

/// Reasons a local game action was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("no game in progress")]
    NoSession,
    #[error("waiting for the opponent to confirm the session")]
    SessionPending,
    #[error("that action belongs to a different game")]
    WrongGame,
    #[error(transparent)]
    Rejected(#[from] MoveRejection),
}

impl StoreError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, StoreError::Rejected(_))
    }
}
