//! Memory-match state machine.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Duration;

use super::{MoveRejection, MEMORY_REVEAL_DELAY};

pub const CARD_FACES: [char; 4] = ['🦋', '🌸', '🌺', '🌻'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub id: u8,
    pub value: char,
    pub is_flipped: bool,
    pub is_matched: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipOutcome {
    /// First card of a pair is face up.
    Revealed,
    /// Second card is face up; the pair resolves after the reveal delay.
    PairPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Matched,
    Mismatched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMatch {
    pub cards: Vec<Card>,
    pub flipped_cards: Vec<u8>,
    pub matches: u32,
    pub moves: u32,
    /// Time since the second card of the pending pair was turned.
    pending_for: Option<Duration>,
}

impl MemoryMatch {
    /// A deck of four pairs shuffled with `seed`. Both peers of a session use
    /// the same seed, so card ids line up.
    pub fn new(seed: u64) -> Self {
        let mut faces: Vec<char> = CARD_FACES.iter().flat_map(|&f| [f, f]).collect();
        faces.shuffle(&mut StdRng::seed_from_u64(seed));
        Self::with_deck(&faces)
    }

    /// A deck laid out exactly as given, no shuffle.
    pub fn with_deck(faces: &[char]) -> Self {
        let cards = faces
            .iter()
            .enumerate()
            .map(|(i, &value)| Card {
                id: i as u8,
                value,
                is_flipped: false,
                is_matched: false,
            })
            .collect();

        Self {
            cards,
            flipped_cards: Vec::with_capacity(2),
            matches: 0,
            moves: 0,
            pending_for: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.cards.iter().all(|card| card.is_matched)
    }

    pub fn is_resolving(&self) -> bool {
        self.pending_for.is_some()
    }

    pub fn flip(&mut self, card_id: u8) -> Result<FlipOutcome, MoveRejection> {
        if self.is_complete() {
            return Err(MoveRejection::GameOver);
        }
        if self.flipped_cards.len() >= 2 {
            return Err(MoveRejection::AwaitingResolution);
        }

        let card = self
            .cards
            .get_mut(card_id as usize)
            .ok_or(MoveRejection::OutOfRange)?;
        if card.is_flipped || card.is_matched {
            return Err(MoveRejection::AlreadyRevealed);
        }

        card.is_flipped = true;
        self.flipped_cards.push(card_id);
        self.moves += 1;

        if self.flipped_cards.len() == 2 {
            self.pending_for = Some(Duration::ZERO);
            Ok(FlipOutcome::PairPending)
        } else {
            Ok(FlipOutcome::Revealed)
        }
    }

    /// Applies the opponent's flip. They can only have flipped after their
    /// copy of the pending pair resolved, so ours is resolved on the spot.
    pub fn apply_remote(&mut self, card_id: u8) -> Result<FlipOutcome, MoveRejection> {
        if self.pending_for.take().is_some() {
            self.resolve();
        }
        self.flip(card_id)
    }

    /// Runs the reveal delay. Returns the resolution once the pending pair has
    /// been face up for [`MEMORY_REVEAL_DELAY`].
    pub fn advance(&mut self, elapsed: Duration) -> Option<Resolution> {
        let waited = self.pending_for.as_mut()?;
        *waited += elapsed;
        if *waited < MEMORY_REVEAL_DELAY {
            return None;
        }

        self.pending_for = None;
        Some(self.resolve())
    }

    fn resolve(&mut self) -> Resolution {
        let pair: Vec<usize> = self.flipped_cards.drain(..).map(usize::from).collect();
        let (first, second) = (pair[0], pair[1]);

        if self.cards[first].value == self.cards[second].value {
            self.cards[first].is_matched = true;
            self.cards[second].is_matched = true;
            self.matches += 1;
            Resolution::Matched
        } else {
            self.cards[first].is_flipped = false;
            self.cards[second].is_flipped = false;
            Resolution::Mismatched
        }
    }
}
