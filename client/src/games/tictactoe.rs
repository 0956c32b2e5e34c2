//! Tic-tac-toe state machine.
//!
//! The inviter plays `X` and moves first. Cells are written once and never
//! overwritten; the turn flips after every accepted placement.

use shared::Mark;

use super::MoveRejection;

/// The eight three-in-a-row lines: rows, columns, diagonals.
pub const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    InProgress,
    Win(Mark),
    Draw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicTacToe {
    pub cells: [Option<Mark>; 9],
    pub current_player: Mark,
    pub outcome: Outcome,
}

impl TicTacToe {
    pub fn new() -> Self {
        Self {
            cells: [None; 9],
            current_player: Mark::X,
            outcome: Outcome::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome != Outcome::InProgress
    }

    pub fn winner(&self) -> Option<Mark> {
        match self.outcome {
            Outcome::Win(mark) => Some(mark),
            _ => None,
        }
    }

    /// Places the local player's mark. Only legal on `local`'s turn.
    pub fn play_local(&mut self, position: usize, local: Mark) -> Result<Mark, MoveRejection> {
        if !self.is_terminal() && self.current_player != local {
            return Err(MoveRejection::NotYourTurn);
        }
        self.place(position, local)
    }

    /// Applies a mark received from the opponent.
    pub fn apply_remote(&mut self, position: usize, mark: Mark) -> Result<Mark, MoveRejection> {
        self.place(position, mark)
    }

    fn place(&mut self, position: usize, mark: Mark) -> Result<Mark, MoveRejection> {
        if self.is_terminal() {
            return Err(MoveRejection::GameOver);
        }
        let cell = self
            .cells
            .get_mut(position)
            .ok_or(MoveRejection::OutOfRange)?;
        if cell.is_some() {
            return Err(MoveRejection::Occupied);
        }
        if mark != self.current_player {
            return Err(MoveRejection::NotYourTurn);
        }

        *cell = Some(mark);
        self.current_player = mark.other();
        self.outcome = self.evaluate();
        Ok(mark)
    }

    fn evaluate(&self) -> Outcome {
        for line in WINNING_LINES {
            if let [Some(a), Some(b), Some(c)] = line.map(|i| self.cells[i]) {
                if a == b && b == c {
                    return Outcome::Win(a);
                }
            }
        }

        if self.cells.iter().all(Option::is_some) {
            Outcome::Draw
        } else {
            Outcome::InProgress
        }
    }
}

impl Default for TicTacToe {
    fn default() -> Self {
        Self::new()
    }
}
