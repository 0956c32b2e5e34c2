//! Pending challenges, sent and received.
//!
//! An invite lives in exactly one of the two sets until it is consumed.
//! Accepting or rejecting removes it; a second accept or reject of the same
//! id finds nothing and does nothing.

use log::debug;
use shared::{Invite, PlayerId};
use std::collections::HashMap;
use uuid::Uuid;

/// Where an invite stands from the local player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteState {
    None,
    PendingSent,
    PendingReceived,
    Accepted,
    Rejected,
}

#[derive(Debug, Default)]
pub struct InviteBook {
    sent: HashMap<Uuid, Invite>,
    received: HashMap<Uuid, Invite>,
    resolved: HashMap<Uuid, InviteState>,
}

impl InviteBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&mut self, invite: Invite) {
        self.sent.insert(invite.id, invite);
    }

    /// Returns false if the invite was already known.
    pub fn record_received(&mut self, invite: Invite) -> bool {
        if self.received.contains_key(&invite.id) || self.resolved.contains_key(&invite.id) {
            debug!("Ignoring repeated invite {}", invite.id);
            return false;
        }
        self.received.insert(invite.id, invite);
        true
    }

    pub fn accept(&mut self, invite_id: &Uuid) -> Option<Invite> {
        let invite = self.received.remove(invite_id)?;
        self.resolved.insert(*invite_id, InviteState::Accepted);
        Some(invite)
    }

    pub fn reject(&mut self, invite_id: &Uuid) -> Option<Invite> {
        let invite = self.received.remove(invite_id)?;
        self.resolved.insert(*invite_id, InviteState::Rejected);
        Some(invite)
    }

    /// Consumes a sent invite once the invitee has answered.
    pub fn take_sent(&mut self, invite_id: &Uuid, accepted: bool) -> Option<Invite> {
        let invite = self.sent.remove(invite_id)?;
        let state = if accepted {
            InviteState::Accepted
        } else {
            InviteState::Rejected
        };
        self.resolved.insert(*invite_id, state);
        Some(invite)
    }

    /// Drops every pending invite involving a player who left the lobby.
    pub fn withdraw_player(&mut self, player_id: &str) -> usize {
        let before = self.sent.len() + self.received.len();
        self.sent.retain(|_, invite| invite.to.id != player_id);
        self.received.retain(|_, invite| invite.from.id != player_id);
        before - self.sent.len() - self.received.len()
    }

    pub fn state(&self, invite_id: &Uuid) -> InviteState {
        if self.sent.contains_key(invite_id) {
            InviteState::PendingSent
        } else if self.received.contains_key(invite_id) {
            InviteState::PendingReceived
        } else {
            self.resolved
                .get(invite_id)
                .copied()
                .unwrap_or(InviteState::None)
        }
    }

    pub fn has_sent_to(&self, player_id: &PlayerId) -> bool {
        self.sent.values().any(|invite| &invite.to.id == player_id)
    }

    /// Received invites, oldest first.
    pub fn received(&self) -> Vec<&Invite> {
        let mut invites: Vec<&Invite> = self.received.values().collect();
        invites.sort_by_key(|invite| invite.timestamp);
        invites
    }

    pub fn sent(&self) -> Vec<&Invite> {
        let mut invites: Vec<&Invite> = self.sent.values().collect();
        invites.sort_by_key(|invite| invite.timestamp);
        invites
    }

    /// Finds a received invite by a prefix of its id, as typed at the console.
    pub fn find_received(&self, prefix: &str) -> Option<Uuid> {
        let prefix = prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() {
            return None;
        }
        let mut matches = self
            .received
            .keys()
            .filter(|id| id.to_string().starts_with(&prefix));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Some(*id),
            _ => None,
        }
    }
}
