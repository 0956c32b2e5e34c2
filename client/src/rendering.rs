//! Plain-text views of the lobby and of whichever game is active.

use shared::{Invite, Mark, Player};
use std::fmt::Write;

use crate::games::memory::MemoryMatch;
use crate::games::quiz::Quiz;
use crate::games::tictactoe::{Outcome, TicTacToe};
use crate::games::word_scramble::WordScramble;
use crate::session::{Session, SessionStatus};
use crate::store::{ActiveGame, GameStore};

pub fn render_roster(players: &[Player]) -> String {
    if players.is_empty() {
        return "Nobody else is here yet.".to_string();
    }

    let mut out = String::from("Players:");
    for player in players {
        let _ = write!(
            out,
            "\n  {:<16} {:<12} {}",
            player.id, player.username, player.status
        );
    }
    out
}

pub fn render_invites(received: &[&Invite], sent: &[&Invite]) -> String {
    if received.is_empty() && sent.is_empty() {
        return "No pending invites.".to_string();
    }

    let mut out = String::new();
    for invite in received {
        let _ = writeln!(
            out,
            "  [{}] {} wants to play {}",
            short_id(invite),
            invite.from.username,
            invite.game
        );
    }
    for invite in sent {
        let _ = writeln!(
            out,
            "  [{}] waiting for {} ({})",
            short_id(invite),
            invite.to.username,
            invite.game
        );
    }
    out.trim_end().to_string()
}

fn short_id(invite: &Invite) -> String {
    invite.id.to_string().chars().take(8).collect()
}

/// Header plus board for the active session, if any.
pub fn render_game(store: &GameStore) -> String {
    let (Some(session), Some(game)) = (store.session(), store.game()) else {
        return "No game in progress.".to_string();
    };

    let mut out = header(session, store.local());
    out.push('\n');
    match game {
        ActiveGame::TicTacToe(board) => out.push_str(&tictactoe(board, session)),
        ActiveGame::Memory(memory) => out.push_str(&memory_board(memory)),
        ActiveGame::Quiz(quiz) => out.push_str(&quiz_view(quiz)),
        ActiveGame::WordScramble(words) => out.push_str(&scramble_view(words)),
    }
    out
}

fn header(session: &Session, local: &Player) -> String {
    let status = match session.status {
        SessionStatus::Pending => "waiting for confirmation".to_string(),
        SessionStatus::Active => "in progress".to_string(),
        SessionStatus::Completed => match &session.winner {
            Some(winner) if *winner == local.id => "you won".to_string(),
            Some(_) => format!("{} won", session.opponent.username),
            None => "finished".to_string(),
        },
        SessionStatus::Abandoned => "abandoned".to_string(),
    };
    format!(
        "== {} vs {} ({}) ==",
        session.game, session.opponent.username, status
    )
}

fn tictactoe(board: &TicTacToe, session: &Session) -> String {
    let mut out = String::new();
    for (r, cells) in board.cells.chunks(3).enumerate() {
        let line: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(c, cell)| match cell {
                Some(mark) => mark.to_string(),
                None => (r * 3 + c).to_string(),
            })
            .collect();
        let _ = writeln!(out, " {} ", line.join(" | "));
        if r < 2 {
            out.push_str("---+---+---\n");
        }
    }

    let mine: Mark = session.role.mark();
    let footer = match board.outcome {
        Outcome::InProgress if board.current_player == mine => format!("Your move ({})", mine),
        Outcome::InProgress => format!("Waiting for {}", session.opponent.username),
        Outcome::Win(mark) => format!("{} wins", mark),
        Outcome::Draw => "Draw".to_string(),
    };
    out.push_str(&footer);
    out
}

fn memory_board(memory: &MemoryMatch) -> String {
    let cards: Vec<String> = memory
        .cards
        .iter()
        .map(|card| {
            if card.is_flipped || card.is_matched {
                format!("[{}]", card.value)
            } else {
                format!("[{}]", card.id)
            }
        })
        .collect();
    format!(
        "{}\n{}\nMatches: {}  Moves: {}",
        cards[..cards.len() / 2].join(" "),
        cards[cards.len() / 2..].join(" "),
        memory.matches,
        memory.moves
    )
}

fn quiz_view(quiz: &Quiz) -> String {
    let scores = format!("Score: {}  Opponent: {}", quiz.score, quiz.opponent_score);
    match quiz.current_question() {
        Some(question) => format!(
            "Question {}/{} ({}s): {}\n  {}\n{}",
            quiz.current_question_index + 1,
            quiz.questions.len(),
            quiz.time_remaining,
            question.prompt,
            question.options.join("  /  "),
            scores
        ),
        None => format!("Quiz over. {}", scores),
    }
}

fn scramble_view(words: &WordScramble) -> String {
    let scores = format!("Score: {}  Opponent: {}", words.score, words.opponent_score);
    if words.is_finished() {
        return format!("Time is up. {}", scores);
    }
    format!(
        "Unscramble: {}  ({}s left)\nFound: {}\n{}",
        words.scrambled_word,
        words.time_remaining,
        if words.guessed_words.is_empty() {
            "-".to_string()
        } else {
            words.guessed_words.join(", ")
        },
        scores
    )
}
