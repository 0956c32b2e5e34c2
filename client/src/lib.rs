//! # Game Client Library
//!
//! Everything a player's process needs to meet other players on the relay,
//! challenge them and play one of four small two-player games.
//!
//! ## Architecture Overview
//!
//! All game authority lives on the clients. The relay only forwards, so each
//! client runs the same deterministic state machines and converges by
//! applying the same moves. Local input is applied optimistically and then
//! broadcast; moves from the opponent are applied on arrival.
//!
//! ### Session handshake
//! A match begins with a three-step exchange so both peers agree on its id
//! before any move is played:
//! 1. the inviter sends an `Invite` carrying a random seed,
//! 2. the invitee answers `InviteAccepted` with a fresh session id and waits,
//! 3. the inviter starts the match and answers `SessionConfirmed`.
//!
//! ### Idempotent moves
//! Every move carries its own id. The store remembers applied ids for the
//! current session and ignores repeats, and the relay never echoes a move to
//! its sender.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! The single logical channel to the relay, behind a [`connection::Connector`]
//! so tests can swap in an in-memory transport.
//!
//! ### Lobby, Invite and Session Modules
//! Presence announcements, the roster, pending invites and the session record.
//!
//! ### Store Module (`store`)
//! The active session plus exactly one game state machine, the move dispatch
//! and the outbox of packets to send.
//!
//! ### Games Module (`games`)
//! Tic-tac-toe, memory-match, quiz and word-scramble.
//!
//! ### Network, Console and Rendering Modules
//! The composition root that wires the above together, the line commands it
//! accepts and the text it prints.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::connection::UdpConnector;
//! use client::lobby::Identity;
//! use client::network::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), client::errors::ClientError> {
//!     let connector = UdpConnector::new("127.0.0.1:8080")?;
//!     let mut client = Client::new(connector, Identity::new("alice", "Alice"));
//!     client
//!         .run(Duration::from_secs(1), Duration::from_millis(100))
//!         .await
//! }
//! ```

pub mod connection;
pub mod console;
pub mod errors;
pub mod games;
pub mod invite;
pub mod lobby;
pub mod network;
pub mod rendering;
pub mod session;
pub mod store;

pub use errors::{ClientError, LobbyError, StoreError};
