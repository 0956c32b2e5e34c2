//! # Lobby Relay Library
//!
//! The relay is the meeting point for game clients. It knows who is connected
//! and what they announced about themselves, and it moves packets between
//! them. It never interprets game traffic: invites, handshake replies and
//! moves are opaque payloads routed by addressee.
//!
//! ## Responsibilities
//!
//! ### Presence
//! Each client registers with a `Connect` packet carrying its player identity.
//! Every registration, presence change, disconnect or timeout causes the full
//! roster to be pushed to all registered clients.
//!
//! ### Routing
//! - Invite and handshake packets go to the single player named in them.
//! - Moves fan out to every registered client except the sender; clients
//!   filter by session id and drop duplicates by move id.
//!
//! ### Liveness
//! Clients heartbeat periodically. Anyone silent for longer than the
//! configured timeout is dropped from the roster.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Connection bookkeeping: ids, addresses, announced players, capacity and
//! timeout detection.
//!
//! ### Network Module (`network`)
//! The UDP socket, the receive/send/timeout tasks and the routing loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{RelayConfig, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), server::network::BoxError> {
//!     let mut relay = Server::new("127.0.0.1:8080", RelayConfig::default()).await?;
//!     relay.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod network;
