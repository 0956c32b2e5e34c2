//! The client composition root.
//!
//! Wires the connection manager, lobby and game store together: inbound
//! packets reach the store through subscriptions, and whatever the store
//! queues in response is flushed back to the relay.

use log::{debug, info, warn};
use shared::{EventKind, Packet, PresenceStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::connection::{ConnectionManager, Connector};
use crate::console::{Command, HELP};
use crate::errors::{ClientError, StoreError};
use crate::lobby::{Identity, Lobby};
use crate::rendering;
use crate::store::{GameStore, TimerEvent};

/// Locks a shared component. A handler that panicked mid-update leaves the
/// data usable, so poisoning is ignored.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue(String),
    Quit,
}

pub struct Client<C> {
    connection: ConnectionManager<C>,
    store: Arc<Mutex<GameStore>>,
    lobby: Arc<Mutex<Lobby>>,
}

impl<C: Connector> Client<C> {
    pub fn new(connector: C, identity: Identity) -> Self {
        let player = identity.player();
        Self {
            connection: ConnectionManager::new(connector, player.clone()),
            store: Arc::new(Mutex::new(GameStore::new(player))),
            lobby: Arc::new(Mutex::new(Lobby::new(identity))),
        }
    }

    pub fn store(&self) -> Arc<Mutex<GameStore>> {
        Arc::clone(&self.store)
    }

    pub fn lobby(&self) -> Arc<Mutex<Lobby>> {
        Arc::clone(&self.lobby)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Subscribes the lobby and store to inbound traffic and announces the
    /// local player as online.
    pub fn activate(&mut self) -> Result<(), ClientError> {
        self.connection.connect()?;

        let lobby = Arc::clone(&self.lobby);
        let store = Arc::clone(&self.store);
        self.connection.subscribe(EventKind::Roster, move |packet| {
            if let Packet::Roster { players } = packet {
                lock(&lobby).apply_roster(players);
                lock(&store).handle_roster(players);
            }
        });

        let lobby = Arc::clone(&self.lobby);
        self.connection.subscribe(EventKind::Connected, move |_| {
            lock(&lobby).registered();
        });

        let store = Arc::clone(&self.store);
        self.connection.subscribe(EventKind::Invite, move |packet| {
            if let Packet::Invite(invite) = packet {
                lock(&store).receive_invite(invite.clone());
            }
        });

        let store = Arc::clone(&self.store);
        self.connection
            .subscribe(EventKind::InviteAccepted, move |packet| {
                if let Packet::InviteAccepted {
                    invite_id,
                    session_id,
                    from,
                    ..
                } = packet
                {
                    lock(&store).handle_invite_accepted(invite_id, *session_id, from.clone());
                }
            });

        let store = Arc::clone(&self.store);
        self.connection
            .subscribe(EventKind::InviteRejected, move |packet| {
                if let Packet::InviteRejected { invite_id, .. } = packet {
                    lock(&store).handle_invite_rejected(invite_id);
                }
            });

        let store = Arc::clone(&self.store);
        self.connection
            .subscribe(EventKind::SessionConfirmed, move |packet| {
                if let Packet::SessionConfirmed {
                    invite_id,
                    session_id,
                    ..
                } = packet
                {
                    lock(&store).handle_session_confirmed(invite_id, session_id);
                }
            });

        let store = Arc::clone(&self.store);
        self.connection
            .subscribe(EventKind::SessionClosed, move |packet| {
                if let Packet::SessionClosed { session_id, .. } = packet {
                    lock(&store).handle_session_closed(session_id);
                }
            });

        let store = Arc::clone(&self.store);
        self.connection.subscribe(EventKind::Move, move |packet| {
            if let Packet::Move(mv) = packet {
                let outcome = lock(&store).apply_remote(mv);
                debug!("Move {} from {}: {:?}", mv.id, mv.player_id, outcome);
            }
        });

        let announce = lock(&self.lobby).announce(PresenceStatus::Online);
        self.connection.send(announce);
        Ok(())
    }

    /// Sends whatever the store queued, then re-announces presence if
    /// joining or leaving a match changed it.
    pub fn flush(&mut self) {
        let (outbox, status) = {
            let mut store = lock(&self.store);
            (store.take_outbox(), store.presence_status())
        };
        for packet in outbox {
            self.connection.send(packet);
        }

        let announce = {
            let mut lobby = lock(&self.lobby);
            (lobby.status() != status).then(|| lobby.announce(status))
        };
        if let Some(packet) = announce {
            self.connection.send(packet);
        }
    }

    /// Waits for one inbound packet. Returns false if the channel was lost.
    pub async fn pump(&mut self) -> bool {
        let received = self.connection.next_event().await.is_some();
        self.flush();
        received
    }

    /// Handles everything already received without waiting.
    pub fn pump_ready(&mut self) -> usize {
        let count = self.connection.drain();
        self.flush();
        count
    }

    pub fn tick(&mut self, elapsed: Duration) -> Option<TimerEvent> {
        let event = lock(&self.store).advance(elapsed);
        self.flush();
        event
    }

    pub fn heartbeat(&mut self) {
        self.connection.send(Packet::Heartbeat);
    }

    pub fn execute(&mut self, command: Command) -> Flow {
        let reply = match command {
            Command::Players => rendering::render_roster(lock(&self.lobby).opponents()),
            Command::Invites => {
                let store = lock(&self.store);
                rendering::render_invites(&store.invites().received(), &store.invites().sent())
            }
            Command::Invite { player_id, game } => {
                let result = {
                    let lobby = lock(&self.lobby);
                    let mut store = lock(&self.store);
                    lobby.invite(&player_id, game, &mut store)
                };
                match result {
                    Ok(invite) => format!("Invited {} to {}", invite.to.username, invite.game),
                    Err(e) => e.to_string(),
                }
            }
            Command::Accept(prefix) => {
                let mut store = lock(&self.store);
                let found = store.invites().find_received(&prefix);
                match found.and_then(|invite_id| store.accept_invite(&invite_id)) {
                    Some(_) => rendering::render_game(&store),
                    None => format!("No pending invite matching `{}`", prefix),
                }
            }
            Command::Reject(prefix) => {
                let mut store = lock(&self.store);
                let found = store.invites().find_received(&prefix);
                if found.map_or(false, |invite_id| store.reject_invite(&invite_id)) {
                    "Invite declined".to_string()
                } else {
                    format!("No pending invite matching `{}`", prefix)
                }
            }
            Command::Play(position) => self.game_action(|store| store.place_mark(position).map(drop)),
            Command::Flip(card_id) => self.game_action(|store| store.flip_card(card_id).map(drop)),
            Command::Answer(answer) => {
                self.game_action(|store| store.answer_question(&answer).map(drop))
            }
            Command::Guess(guess) => {
                let mut store = lock(&self.store);
                match store.guess_word(&guess) {
                    Ok(Some(_)) => rendering::render_game(&store),
                    Ok(None) => "Not quite, try again".to_string(),
                    Err(e) => e.to_string(),
                }
            }
            Command::Show => rendering::render_game(&lock(&self.store)),
            Command::Leave => {
                lock(&self.store).end_game();
                "Left the game".to_string()
            }
            Command::Help => HELP.to_string(),
            Command::Quit => return Flow::Quit,
        };

        self.flush();
        Flow::Continue(reply)
    }

    fn game_action<F>(&mut self, action: F) -> String
    where
        F: FnOnce(&mut GameStore) -> Result<(), StoreError>,
    {
        let mut store = lock(&self.store);
        match action(&mut *store) {
            Ok(()) => rendering::render_game(&store),
            Err(e) => e.to_string(),
        }
    }

    /// Leaves any match, announces the player offline and closes the channel.
    pub fn shutdown(&mut self) {
        lock(&self.store).end_game();
        self.flush();
        let offline = lock(&self.lobby).announce(PresenceStatus::Offline);
        self.connection.send(offline);
        self.connection.disconnect();
    }

    /// Runs the console session until `quit`, end of input or Ctrl+C.
    pub async fn run(&mut self, heartbeat: Duration, tick: Duration) -> Result<(), ClientError> {
        self.activate()?;
        println!("{}", HELP);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut heartbeat_interval = interval(heartbeat);
        let mut tick_interval = interval(tick);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line? {
                        Some(line) => line,
                        None => break,
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<Command>() {
                        Ok(command) => match self.execute(command) {
                            Flow::Continue(reply) => println!("{}", reply),
                            Flow::Quit => break,
                        },
                        Err(e) => println!("{}", e),
                    }
                }

                event = self.connection.next_event() => {
                    let Some(packet) = event else {
                        warn!("Lost the relay; will reconnect on next send");
                        continue;
                    };
                    self.flush();
                    if let Some(note) = self.describe(&packet) {
                        println!("{}", note);
                    }
                }

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let elapsed = now - last_tick;
                    last_tick = now;
                    if self.tick(elapsed).is_some() {
                        println!("{}", rendering::render_game(&lock(&self.store)));
                    }
                }

                _ = heartbeat_interval.tick() => {
                    self.heartbeat();
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// What to print after an inbound packet, if anything.
    fn describe(&self, packet: &Packet) -> Option<String> {
        match packet {
            Packet::Invite(invite) => {
                let short: String = invite.id.to_string().chars().take(8).collect();
                Some(format!(
                    "{} invites you to {}. Type `accept {}` or `reject {}`",
                    invite.from.username, invite.game, short, short
                ))
            }
            Packet::InviteRejected { .. } => Some("Your invite was declined".to_string()),
            Packet::InviteAccepted { .. }
            | Packet::SessionConfirmed { .. }
            | Packet::SessionClosed { .. }
            | Packet::Move(_) => Some(rendering::render_game(&lock(&self.store))),
            Packet::Disconnected { reason } => Some(format!("Relay refused us: {}", reason)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Channel;
    use crate::session::SessionStatus;
    use shared::{GameKind, Player};
    use tokio::sync::mpsc;

    type Far = (mpsc::UnboundedReceiver<Packet>, mpsc::UnboundedSender<Packet>);

    #[derive(Clone, Default)]
    struct Wire {
        ends: Arc<Mutex<Vec<Far>>>,
    }

    impl Connector for Wire {
        fn open(&mut self) -> Result<Channel, ClientError> {
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            self.ends.lock().unwrap().push((out_rx, in_tx));
            Ok(Channel::new(out_tx, in_rx))
        }
    }

    impl Wire {
        /// Drains what went out on the most recently opened channel.
        fn outgoing(&self) -> Vec<Packet> {
            let mut ends = self.ends.lock().unwrap();
            let (out_rx, _) = ends.last_mut().unwrap();
            let mut packets = Vec::new();
            while let Ok(packet) = out_rx.try_recv() {
                packets.push(packet);
            }
            packets
        }

        fn deliver(&self, packet: Packet) {
            let ends = self.ends.lock().unwrap();
            ends.last().unwrap().1.send(packet).unwrap();
        }

        fn opened(&self) -> usize {
            self.ends.lock().unwrap().len()
        }
    }

    fn client(id: &str) -> (Client<Wire>, Wire) {
        let wire = Wire::default();
        let mut client = Client::new(wire.clone(), Identity::new(id, id.to_uppercase()));
        client.activate().unwrap();
        (client, wire)
    }

    /// Plays relay between two in-memory clients until both are quiet.
    fn relay(a: &mut (Client<Wire>, Wire), b: &mut (Client<Wire>, Wire)) {
        loop {
            let mut moved = 0;
            for packet in a.1.outgoing() {
                if forwards(&packet) {
                    b.1.deliver(packet);
                    moved += 1;
                }
            }
            for packet in b.1.outgoing() {
                if forwards(&packet) {
                    a.1.deliver(packet);
                    moved += 1;
                }
            }
            a.0.pump_ready();
            b.0.pump_ready();
            if moved == 0 {
                break;
            }
        }
    }

    fn forwards(packet: &Packet) -> bool {
        packet.recipient().is_some() || matches!(packet, Packet::Move(_))
    }

    fn roster(ids: &[&str]) -> Packet {
        Packet::Roster {
            players: ids.iter().map(|id| Player::new(*id, id.to_uppercase())).collect(),
        }
    }

    #[test]
    fn test_activate_registers_and_announces() {
        let (_client, wire) = client("alice");
        let sent = wire.outgoing();
        assert!(matches!(sent[0], Packet::Connect { .. }));
        assert_eq!(
            sent[1],
            Packet::Presence {
                player_id: "alice".into(),
                status: PresenceStatus::Online
            }
        );
    }

    #[test]
    fn test_full_match_between_two_clients() {
        let mut a = client("alice");
        let mut b = client("bob");
        a.1.deliver(roster(&["alice", "bob"]));
        b.1.deliver(roster(&["alice", "bob"]));
        a.0.pump_ready();
        b.0.pump_ready();
        a.1.outgoing();
        b.1.outgoing();

        let reply = a.0.execute(Command::Invite {
            player_id: "bob".into(),
            game: GameKind::TicTacToe,
        });
        assert_eq!(reply, Flow::Continue("Invited BOB to tictactoe".into()));
        relay(&mut a, &mut b);

        let invite_id = lock(&b.0.store()).invites().received()[0].id;
        let reply = b.0.execute(Command::Accept(invite_id.to_string()[..8].to_string()));
        assert!(matches!(reply, Flow::Continue(ref text) if text.contains("waiting for confirmation")));
        relay(&mut a, &mut b);

        let session_a = lock(&a.0.store()).session().cloned().unwrap();
        let session_b = lock(&b.0.store()).session().cloned().unwrap();
        assert_eq!(session_a.id, session_b.id);
        assert_eq!(session_b.status, SessionStatus::Active);
        assert_eq!(lock(&a.0.lobby()).status(), PresenceStatus::InGame);

        for (player, cell) in [(0, 4), (1, 0), (0, 2), (1, 1), (0, 6)] {
            let target = if player == 0 { &mut a.0 } else { &mut b.0 };
            target.execute(Command::Play(cell));
            relay(&mut a, &mut b);
        }

        for side in [&a.0, &b.0] {
            let store = side.store();
            let store = lock(&store);
            let session = store.session().unwrap();
            assert_eq!(session.status, SessionStatus::Completed);
            assert_eq!(session.winner.as_deref(), Some("alice"));
        }
    }

    #[test]
    fn test_leaving_reannounces_online() {
        let (mut client, wire) = client("alice");
        wire.outgoing();
        lock(&client.store()).start_game(GameKind::Quiz, Player::new("bob", "Bob"));
        client.flush();
        assert!(wire.outgoing().contains(&Packet::Presence {
            player_id: "alice".into(),
            status: PresenceStatus::InGame
        }));

        assert_eq!(
            client.execute(Command::Leave),
            Flow::Continue("Left the game".into())
        );
        let sent = wire.outgoing();
        assert!(matches!(sent[0], Packet::SessionClosed { .. }));
        assert_eq!(
            sent[1],
            Packet::Presence {
                player_id: "alice".into(),
                status: PresenceStatus::Online
            }
        );
    }

    #[test]
    fn test_reconnect_mid_match_reannounces_in_game() {
        let (mut client, wire) = client("alice");
        wire.deliver(Packet::Connected { connection_id: 1 });
        client.pump_ready();
        lock(&client.store()).start_game(GameKind::Memory, Player::new("bob", "Bob"));
        client.flush();
        wire.outgoing();

        // The relay forgets us and we register again
        wire.deliver(Packet::Disconnected {
            reason: "Not registered".into(),
        });
        client.pump_ready();
        assert!(!client.is_connected());
        client.heartbeat();
        assert_eq!(wire.opened(), 2);
        wire.deliver(Packet::Connected { connection_id: 2 });
        client.pump_ready();

        let sent = wire.outgoing();
        assert!(matches!(sent[0], Packet::Connect { .. }));
        assert_eq!(sent[1], Packet::Heartbeat);
        assert_eq!(
            sent[2],
            Packet::Presence {
                player_id: "alice".into(),
                status: PresenceStatus::InGame
            }
        );
        assert_eq!(lock(&client.lobby()).status(), PresenceStatus::InGame);
    }

    #[test]
    fn test_registration_while_online_sends_nothing_extra() {
        let (mut client, wire) = client("alice");
        wire.outgoing();
        wire.deliver(Packet::Connected { connection_id: 1 });
        client.pump_ready();
        assert!(wire.outgoing().is_empty());
    }

    #[test]
    fn test_game_command_without_session() {
        let (mut client, _wire) = client("alice");
        assert_eq!(
            client.execute(Command::Flip(0)),
            Flow::Continue("no game in progress".into())
        );
        assert_eq!(client.execute(Command::Quit), Flow::Quit);
    }

    #[test]
    fn test_shutdown_goes_offline() {
        let (mut client, wire) = client("alice");
        wire.outgoing();
        client.shutdown();

        let sent = wire.outgoing();
        assert_eq!(
            sent,
            vec![
                Packet::Presence {
                    player_id: "alice".into(),
                    status: PresenceStatus::Offline
                },
                Packet::Disconnect
            ]
        );
        assert!(!client.is_connected());
    }
}
