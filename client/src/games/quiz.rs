//! Timed quiz state machine.
//!
//! One question at a time, each with its own countdown. An answer advances
//! immediately; an expired countdown advances without scoring.

use std::collections::BTreeMap;
use std::time::Duration;

use super::{MoveRejection, SecondClock, POINTS, QUIZ_SECONDS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
    pub answer: String,
}

impl Question {
    pub fn new(prompt: &str, options: &[&str], answer: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            answer: answer.to_string(),
        }
    }
}

pub fn default_questions() -> Vec<Question> {
    vec![
        Question::new(
            "Which planet is closest to the sun?",
            &["Venus", "Mercury", "Mars", "Earth"],
            "Mercury",
        ),
        Question::new(
            "How many sides does a hexagon have?",
            &["5", "6", "7", "8"],
            "6",
        ),
        Question::new(
            "What is the largest ocean on Earth?",
            &["Atlantic", "Indian", "Arctic", "Pacific"],
            "Pacific",
        ),
        Question::new(
            "Which gas do plants absorb from the air?",
            &["Oxygen", "Nitrogen", "Carbon dioxide", "Helium"],
            "Carbon dioxide",
        ),
        Question::new(
            "How many minutes are in two hours?",
            &["100", "120", "140", "180"],
            "120",
        ),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub question: usize,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quiz {
    pub current_question_index: usize,
    pub questions: Vec<Question>,
    pub answers: BTreeMap<usize, String>,
    pub score: u32,
    pub time_remaining: u32,
    pub opponent_answers: BTreeMap<usize, String>,
    pub opponent_score: u32,
    clock: SecondClock,
}

impl Quiz {
    pub fn new() -> Self {
        Self::with_questions(default_questions())
    }

    pub fn with_questions(questions: Vec<Question>) -> Self {
        Self {
            current_question_index: 0,
            questions,
            answers: BTreeMap::new(),
            score: 0,
            time_remaining: QUIZ_SECONDS,
            opponent_answers: BTreeMap::new(),
            opponent_score: 0,
            clock: SecondClock::default(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.current_question_index >= self.questions.len()
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_question_index)
    }

    /// Records an answer to the current question and moves on.
    pub fn answer(&mut self, answer: &str) -> Result<AnswerOutcome, MoveRejection> {
        let question = self.current_question_index;
        let correct = self
            .current_question()
            .map(|q| q.answer == answer)
            .ok_or(MoveRejection::GameOver)?;

        if correct {
            self.score += POINTS;
        }
        self.answers.insert(question, answer.to_string());
        self.next_question();

        Ok(AnswerOutcome { question, correct })
    }

    /// Counts down. Returns how many questions were skipped because their
    /// countdown ran out.
    pub fn advance(&mut self, elapsed: Duration) -> usize {
        let mut expired = 0;
        for _ in 0..self.clock.accumulate(elapsed) {
            if self.is_finished() {
                break;
            }
            self.time_remaining = self.time_remaining.saturating_sub(1);
            if self.time_remaining == 0 {
                self.next_question();
                expired += 1;
            }
        }
        expired
    }

    /// Tallies the opponent's answer. Each question counts once.
    pub fn apply_remote(&mut self, question: usize, answer: &str) -> bool {
        let Some(expected) = self.questions.get(question).map(|q| q.answer.as_str()) else {
            return false;
        };
        if self.opponent_answers.contains_key(&question) {
            return false;
        }

        if expected == answer {
            self.opponent_score += POINTS;
        }
        self.opponent_answers.insert(question, answer.to_string());
        true
    }

    fn next_question(&mut self) {
        self.current_question_index += 1;
        self.time_remaining = if self.is_finished() { 0 } else { QUIZ_SECONDS };
        self.clock.reset();
    }
}

impl Default for Quiz {
    fn default() -> Self {
        Self::new()
    }
}
