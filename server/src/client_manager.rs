//! Connection tracking for the relay
//!
//! This module handles the relay-side bookkeeping of connected players:
//! - Connection lifecycle (register, disconnect, timeout)
//! - Address and player-id lookup for routing addressed packets
//! - Presence status and the roster pushed to every client
//! - Capacity limits
//!
//! The relay never looks inside game traffic; this is the only state it owns.

use log::info;
use shared::{Player, PresenceStatus};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A registered connection and the player announced on it
#[derive(Debug)]
pub struct Client {
    /// Connection identifier assigned by the relay
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Identity and presence as announced by the client
    pub player: Player,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, player: Player) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            player,
        }
    }

    /// Marks the client as recently active.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing has been heard from this client within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all registered connections
///
/// Each player id is registered at most once; a second `Connect` for the same
/// player (a client that rebound its socket) replaces the earlier entry.
pub struct ClientManager {
    /// Registered clients indexed by connection id
    clients: HashMap<u32, Client>,
    /// Next available connection id
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty manager. Connection ids start from 1.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a player connecting from `addr`
    ///
    /// Any earlier registration from the same address or for the same player
    /// id is dropped first. Returns None if the relay is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, player: Player) -> Option<u32> {
        let stale: Vec<u32> = self
            .clients
            .values()
            .filter(|client| client.addr == addr || client.player.id == player.id)
            .map(|client| client.id)
            .collect();
        for client_id in stale {
            self.remove_client(&client_id);
        }

        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!(
            "Client {} registered as {} ({}) from {}",
            client_id, player.id, player.username, addr
        );
        self.clients
            .insert(client_id, Client::new(client_id, addr, player));

        Some(client_id)
    }

    /// Removes a client, returning it if it was registered.
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let removed = self.clients.remove(client_id);
        if let Some(client) = &removed {
            info!("Client {} ({}) disconnected", client.id, client.player.id);
        }
        removed
    }

    /// Finds a client id by network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Finds the client a player id is registered on
    pub fn find_client_by_player(&self, player_id: &str) -> Option<&Client> {
        self.clients
            .values()
            .find(|client| client.player.id == player_id)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Refreshes the activity timestamp of whoever sent from `addr`.
    pub fn touch(&mut self, addr: SocketAddr) -> Option<u32> {
        let client = self.clients.values_mut().find(|client| client.addr == addr)?;
        client.touch();
        Some(client.id)
    }

    /// Updates a client's presence. Returns true if the status changed.
    pub fn set_status(&mut self, client_id: u32, status: PresenceStatus) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) if client.player.status != status => {
                client.player.status = status;
                true
            }
            _ => false,
        }
    }

    /// Every visible player, ordered by username then id
    ///
    /// Players who announced `Offline` stay registered but are hidden.
    pub fn roster(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self
            .clients
            .values()
            .filter(|client| client.player.status != PresenceStatus::Offline)
            .map(|client| client.player.clone())
            .collect();
        players.sort_by(|a, b| a.username.cmp(&b.username).then(a.id.cmp(&b.id)));
        players
    }

    /// Removes clients silent for longer than `timeout` and returns them.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Client> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    /// All connection ids and their addresses, for broadcasting
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
