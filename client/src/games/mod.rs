//! The four mini-game state machines.
//!
//! Each machine is a plain value: local input and remote moves are method
//! calls, timers are driven by `advance(elapsed)`. Nothing here touches the
//! network; the store decides which calls turn into outgoing moves.

pub mod memory;
pub mod quiz;
pub mod tictactoe;
pub mod word_scramble;

use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryMatch;
pub use quiz::Quiz;
pub use tictactoe::TicTacToe;
pub use word_scramble::WordScramble;

/// Points for a correct quiz answer or word guess.
pub const POINTS: u32 = 10;
pub const QUIZ_SECONDS: u32 = 30;
pub const SCRAMBLE_SECONDS: u32 = 60;
pub const MEMORY_REVEAL_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejection {
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("that cell is already taken")]
    Occupied,
    #[error("no such cell or card")]
    OutOfRange,
    #[error("the game is over")]
    GameOver,
    #[error("wait for the face-up pair to resolve")]
    AwaitingResolution,
    #[error("that card is already face up")]
    AlreadyRevealed,
}

/// Whole seconds elapsed on a countdown, keeping the sub-second remainder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SecondClock {
    carry: Duration,
}

impl SecondClock {
    pub(crate) fn accumulate(&mut self, elapsed: Duration) -> u32 {
        self.carry += elapsed;
        let whole = self.carry.as_secs();
        self.carry -= Duration::from_secs(whole);
        whole.min(u32::MAX as u64) as u32
    }

    pub(crate) fn reset(&mut self) {
        self.carry = Duration::ZERO;
    }
}
