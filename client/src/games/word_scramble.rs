//! Timed word-scramble state machine. A single countdown covers the whole
//! game; every correct guess draws a fresh word.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Duration;

use super::{MoveRejection, SecondClock, POINTS, SCRAMBLE_SECONDS};

pub const WORDS: [&str; 10] = [
    "ELEGANT", "HARMONY", "BLOSSOM", "GENTLE", "RADIANT", "SERENE", "VELVET", "MEADOW",
    "LANTERN", "WHISPER",
];

const SCRAMBLE_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessOutcome {
    Correct { word: String },
    Incorrect,
}

#[derive(Debug, Clone)]
pub struct WordScramble {
    pub current_word: String,
    pub scrambled_word: String,
    pub guessed_words: Vec<String>,
    pub time_remaining: u32,
    pub score: u32,
    pub opponent_guessed: Vec<String>,
    pub opponent_score: u32,
    rng: StdRng,
    clock: SecondClock,
}

impl WordScramble {
    pub fn new(seed: u64) -> Self {
        let mut game = Self {
            current_word: String::new(),
            scrambled_word: String::new(),
            guessed_words: Vec::new(),
            time_remaining: SCRAMBLE_SECONDS,
            score: 0,
            opponent_guessed: Vec::new(),
            opponent_score: 0,
            rng: StdRng::seed_from_u64(seed),
            clock: SecondClock::default(),
        };
        game.draw_word();
        game
    }

    pub fn is_finished(&self) -> bool {
        self.time_remaining == 0
    }

    pub fn guess(&mut self, guess: &str) -> Result<GuessOutcome, MoveRejection> {
        if self.is_finished() {
            return Err(MoveRejection::GameOver);
        }
        if !guess.trim().eq_ignore_ascii_case(&self.current_word) {
            return Ok(GuessOutcome::Incorrect);
        }

        let word = std::mem::take(&mut self.current_word);
        self.score += POINTS;
        self.guessed_words.push(word.clone());
        self.draw_word();

        Ok(GuessOutcome::Correct { word })
    }

    /// Counts down. Returns true on the tick that ends the game.
    pub fn advance(&mut self, elapsed: Duration) -> bool {
        if self.is_finished() {
            return false;
        }
        let seconds = self.clock.accumulate(elapsed);
        self.time_remaining = self.time_remaining.saturating_sub(seconds);
        self.is_finished()
    }

    /// Credits the opponent for a guess that names a listed word.
    pub fn apply_remote(&mut self, guess: &str) -> bool {
        let Some(word) = WORDS.iter().find(|w| w.eq_ignore_ascii_case(guess.trim())) else {
            return false;
        };
        if self.opponent_guessed.iter().any(|g| g == word) {
            return false;
        }

        self.opponent_guessed.push(word.to_string());
        self.opponent_score += POINTS;
        true
    }

    fn draw_word(&mut self) {
        let fresh: Vec<&str> = WORDS
            .iter()
            .copied()
            .filter(|w| !self.guessed_words.iter().any(|g| g == w))
            .collect();
        let pool = if fresh.is_empty() { &WORDS[..] } else { &fresh[..] };

        let word = pool.choose(&mut self.rng).copied().unwrap_or(WORDS[0]);
        self.current_word = word.to_string();
        self.scrambled_word = scramble(word, &mut self.rng);
    }
}

impl PartialEq for WordScramble {
    fn eq(&self, other: &Self) -> bool {
        self.current_word == other.current_word
            && self.scrambled_word == other.scrambled_word
            && self.guessed_words == other.guessed_words
            && self.time_remaining == other.time_remaining
            && self.score == other.score
            && self.opponent_guessed == other.opponent_guessed
            && self.opponent_score == other.opponent_score
    }
}

/// Permutes the letters of `word`. The result differs from `word` whenever
/// it has at least two distinct letters.
pub fn scramble(word: &str, rng: &mut StdRng) -> String {
    let original: Vec<char> = word.chars().collect();
    let mut letters = original.clone();

    for _ in 0..SCRAMBLE_ATTEMPTS {
        letters.shuffle(rng);
        if letters != original {
            return letters.into_iter().collect();
        }
    }

    letters.rotate_left(1);
    letters.into_iter().collect()
}
