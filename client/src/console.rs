//! Line commands typed at the client console.

use shared::GameKind;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Players,
    Invite { player_id: String, game: GameKind },
    Accept(String),
    Reject(String),
    Invites,
    Play(usize),
    Flip(u8),
    Answer(String),
    Guess(String),
    Show,
    Leave,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error(transparent)]
    Game(#[from] shared::UnknownGame),
}

pub const HELP: &str = "\
players                      list who is online
invite <player-id> <game>    challenge a player (tictactoe, memory, quiz, wordscramble)
invites                      list pending invites
accept <invite-id>           accept an invite (a unique id prefix is enough)
reject <invite-id>           decline an invite
play <0-8>                   place your mark
flip <0-7>                   turn a card
answer <text>                answer the current question
guess <word>                 guess the scrambled word
show                         redraw the current game
leave                        leave the current game
quit                         exit";

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "players" | "who" => Command::Players,
            "invite" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next(), args.next()) {
                    (Some(player_id), Some(game), None) => Command::Invite {
                        player_id: player_id.to_string(),
                        game: game.parse()?,
                    },
                    _ => return Err(ParseError::Usage("invite <player-id> <game>")),
                }
            }
            "accept" => Command::Accept(single(rest, "accept <invite-id>")?),
            "reject" => Command::Reject(single(rest, "reject <invite-id>")?),
            "invites" => Command::Invites,
            "play" => Command::Play(
                rest.parse()
                    .map_err(|_| ParseError::Usage("play <0-8>"))?,
            ),
            "flip" => Command::Flip(
                rest.parse()
                    .map_err(|_| ParseError::Usage("flip <0-7>"))?,
            ),
            "answer" if !rest.is_empty() => Command::Answer(rest.to_string()),
            "answer" => return Err(ParseError::Usage("answer <text>")),
            "guess" => Command::Guess(single(rest, "guess <word>")?),
            "show" => Command::Show,
            "leave" => Command::Leave,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => return Err(ParseError::Unknown(verb.to_string())),
        };
        Ok(command)
    }
}

fn single(rest: &str, usage: &'static str) -> Result<String, ParseError> {
    let mut args = rest.split_whitespace();
    match (args.next(), args.next()) {
        (Some(arg), None) => Ok(arg.to_string()),
        _ => Err(ParseError::Usage(usage)),
    }
}
