//! Integration tests for the relay and two real clients
//!
//! These tests run the relay on an ephemeral port and drive clients over UDP.

use client::connection::UdpConnector;
use client::console::Command;
use client::lobby::Identity;
use client::network::{lock, Client, Flow};
use client::session::SessionStatus;
use client::store::{ActiveGame, GameStore};
use server::network::{RelayConfig, Server, NOT_REGISTERED};
use shared::{GameKind, Mark, Packet, Player, PresenceStatus, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

type UdpClient = Client<UdpConnector>;

async fn start_relay(config: RelayConfig) -> SocketAddr {
    let mut relay = Server::new("127.0.0.1:0", config).await.unwrap();
    let addr = relay.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = relay.run().await;
    });
    addr
}

fn start_client(relay: SocketAddr, id: &str) -> UdpClient {
    let connector = UdpConnector::new(&relay.to_string()).unwrap();
    let mut client = Client::new(connector, Identity::new(id, id.to_uppercase()));
    client.activate().unwrap();
    client
}

/// Pumps both clients until `done` holds or five seconds pass.
async fn pump_until(a: &mut UdpClient, b: &mut UdpClient, done: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for clients");
        tokio::select! {
            _ = a.pump() => {}
            _ = b.pump() => {}
            _ = sleep(Duration::from_millis(20)) => {}
        }
    }
}

/// Like `pump_until`, but `b` (and `a` when `beat_a` is set) keeps sending
/// heartbeats so the relay does not evict it.
async fn pump_beating(
    a: &mut UdpClient,
    b: &mut UdpClient,
    beat_a: bool,
    done: impl Fn() -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for clients");
        b.heartbeat();
        if beat_a {
            a.heartbeat();
        }
        tokio::select! {
            _ = a.pump() => {}
            _ = b.pump() => {}
            _ = sleep(Duration::from_millis(20)) => {}
        }
    }
}

async fn lobby_pair(relay: SocketAddr) -> (UdpClient, UdpClient) {
    let mut alice = start_client(relay, "alice");
    let mut bob = start_client(relay, "bob");

    let (lobby_a, lobby_b) = (alice.lobby(), bob.lobby());
    pump_until(&mut alice, &mut bob, || {
        lock(&lobby_a).find("bob").is_some() && lock(&lobby_b).find("alice").is_some()
    })
    .await;
    (alice, bob)
}

fn short_invite_id(client: &UdpClient) -> String {
    let store = client.store();
    let store = lock(&store);
    store.invites().received()[0].id.to_string()[..8].to_string()
}

fn cell_taken(store: &Arc<Mutex<GameStore>>, cell: usize) -> bool {
    matches!(
        lock(store).game(),
        Some(ActiveGame::TicTacToe(board)) if board.cells[cell].is_some()
    )
}

/// LOBBY AND HANDSHAKE TESTS
mod session_tests {
    use super::*;

    /// Both players see each other and agree on a session after the handshake
    #[tokio::test]
    async fn handshake_over_relay() {
        let relay = start_relay(RelayConfig::default()).await;
        let (mut alice, mut bob) = lobby_pair(relay).await;

        let reply = alice.execute(Command::Invite {
            player_id: "bob".into(),
            game: GameKind::Memory,
        });
        assert_eq!(reply, Flow::Continue("Invited BOB to memory".into()));

        let store_b = bob.store();
        pump_until(&mut alice, &mut bob, || {
            !lock(&store_b).invites().received().is_empty()
        })
        .await;

        let prefix = short_invite_id(&bob);
        bob.execute(Command::Accept(prefix));

        let store_a = alice.store();
        pump_until(&mut alice, &mut bob, || {
            lock(&store_b).session().map(|s| s.status) == Some(SessionStatus::Active)
        })
        .await;

        let a = lock(&store_a);
        let b = lock(&store_b);
        assert_eq!(a.session().map(|s| s.id), b.session().map(|s| s.id));
        assert_eq!(a.session().map(|s| s.status), Some(SessionStatus::Active));
        assert_eq!(a.game(), b.game());
    }

    /// A rejected invite leaves no session on either side
    #[tokio::test]
    async fn rejected_invite_over_relay() {
        let relay = start_relay(RelayConfig::default()).await;
        let (mut alice, mut bob) = lobby_pair(relay).await;

        alice.execute(Command::Invite {
            player_id: "bob".into(),
            game: GameKind::Memory,
        });
        let (store_a, store_b) = (alice.store(), bob.store());
        pump_until(&mut alice, &mut bob, || {
            !lock(&store_b).invites().received().is_empty()
        })
        .await;

        let prefix = short_invite_id(&bob);
        assert_eq!(
            bob.execute(Command::Reject(prefix)),
            Flow::Continue("Invite declined".into())
        );
        pump_until(&mut alice, &mut bob, || {
            lock(&store_a).invites().sent().is_empty()
        })
        .await;

        assert!(lock(&store_a).session().is_none());
        assert!(lock(&store_b).session().is_none());
        assert!(lock(&store_b).invites().received().is_empty());
    }

    /// Presence follows the match: in-game while playing, online after leaving
    #[tokio::test]
    async fn presence_follows_match() {
        let relay = start_relay(RelayConfig::default()).await;
        let (mut alice, mut bob) = lobby_pair(relay).await;

        alice.execute(Command::Invite {
            player_id: "bob".into(),
            game: GameKind::Quiz,
        });
        let store_b = bob.store();
        pump_until(&mut alice, &mut bob, || {
            !lock(&store_b).invites().received().is_empty()
        })
        .await;
        let prefix = short_invite_id(&bob);
        bob.execute(Command::Accept(prefix));

        let lobby_b = bob.lobby();
        pump_until(&mut alice, &mut bob, || {
            lock(&lobby_b).find("alice").map(|p| p.status) == Some(PresenceStatus::InGame)
        })
        .await;

        alice.execute(Command::Leave);
        pump_until(&mut alice, &mut bob, || {
            lock(&store_b).session().map(|s| s.status) == Some(SessionStatus::Abandoned)
                && lock(&lobby_b).find("alice").map(|p| p.status) == Some(PresenceStatus::Online)
        })
        .await;
    }
}

/// RECOVERY TESTS
mod recovery_tests {
    use super::*;

    /// A client the relay timed out registers again on its next heartbeat
    #[tokio::test]
    async fn evicted_client_registers_again() {
        let relay = start_relay(RelayConfig {
            client_timeout: Duration::from_millis(300),
            ..RelayConfig::default()
        })
        .await;
        let (mut alice, mut bob) = lobby_pair(relay).await;
        let lobby_b = bob.lobby();

        // Alice goes quiet and drops off the roster
        pump_beating(&mut alice, &mut bob, false, || {
            lock(&lobby_b).find("alice").is_none()
        })
        .await;

        pump_beating(&mut alice, &mut bob, true, || {
            lock(&lobby_b).find("alice").is_some()
        })
        .await;
        assert!(alice.is_connected());
    }
}

/// GAMEPLAY TESTS
mod gameplay_tests {
    use super::*;

    /// A full tic-tac-toe match converges on both clients
    #[tokio::test]
    async fn tictactoe_match_over_relay() {
        let relay = start_relay(RelayConfig::default()).await;
        let (mut alice, mut bob) = lobby_pair(relay).await;

        alice.execute(Command::Invite {
            player_id: "bob".into(),
            game: GameKind::TicTacToe,
        });
        let (store_a, store_b) = (alice.store(), bob.store());
        pump_until(&mut alice, &mut bob, || {
            !lock(&store_b).invites().received().is_empty()
        })
        .await;
        let prefix = short_invite_id(&bob);
        bob.execute(Command::Accept(prefix));
        pump_until(&mut alice, &mut bob, || {
            lock(&store_b).session().map(|s| s.status) == Some(SessionStatus::Active)
        })
        .await;

        for (turn, cell) in [0usize, 3, 1, 4, 2].into_iter().enumerate() {
            let (mover, watcher) = if turn % 2 == 0 {
                (&mut alice, &store_b)
            } else {
                (&mut bob, &store_a)
            };
            match mover.execute(Command::Play(cell)) {
                Flow::Continue(text) => assert!(!text.contains("not your turn"), "{}", text),
                Flow::Quit => panic!("unexpected quit"),
            }
            pump_until(&mut alice, &mut bob, || cell_taken(watcher, cell)).await;
        }

        for store in [&store_a, &store_b] {
            let store = lock(store);
            let session = store.session().unwrap();
            assert_eq!(session.status, SessionStatus::Completed);
            assert_eq!(session.winner.as_deref(), Some("alice"));
            match store.game() {
                Some(ActiveGame::TicTacToe(board)) => {
                    assert!(board.cells[..3] == [Some(Mark::X); 3]);
                }
                other => panic!("Unexpected game: {:?}", other),
            }
        }
    }
}

/// RELAY PROTOCOL TESTS
mod relay_tests {
    use super::*;
    use std::net::UdpSocket;

    fn raw_socket() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind client socket");
        socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        socket
    }

    fn receive(socket: &UdpSocket) -> Packet {
        let mut buf = [0; shared::MAX_DATAGRAM_SIZE];
        let (size, _) = socket.recv_from(&mut buf).unwrap();
        Packet::decode(&buf[..size]).unwrap()
    }

    /// Tests that a client with a different protocol version is refused
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn version_mismatch_is_refused() {
        let relay = start_relay(RelayConfig::default()).await;
        let socket = raw_socket();

        let hello = Packet::Connect {
            client_version: PROTOCOL_VERSION + 1,
            player: Player::new("old", "Old"),
        };
        socket.send_to(&hello.encode().unwrap(), relay).unwrap();

        match receive(&socket) {
            Packet::Disconnected { reason } => assert_eq!(reason, "Protocol version mismatch"),
            other => panic!("Wrong packet type received: {:?}", other),
        }
    }

    /// Tests that traffic from a forgotten address is told to register again
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unregistered_heartbeat_is_refused() {
        let relay = start_relay(RelayConfig::default()).await;
        let socket = raw_socket();

        socket
            .send_to(&Packet::Heartbeat.encode().unwrap(), relay)
            .unwrap();

        match receive(&socket) {
            Packet::Disconnected { reason } => assert_eq!(reason, NOT_REGISTERED),
            other => panic!("Wrong packet type received: {:?}", other),
        }
    }

    /// Tests the capacity limit
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_relay_refuses_registration() {
        let relay = start_relay(RelayConfig {
            max_clients: 1,
            ..RelayConfig::default()
        })
        .await;

        let first = raw_socket();
        let hello = |id: &str| Packet::Connect {
            client_version: PROTOCOL_VERSION,
            player: Player::new(id, id),
        };
        first.send_to(&hello("a").encode().unwrap(), relay).unwrap();
        assert!(matches!(receive(&first), Packet::Connected { .. }));
        assert!(matches!(receive(&first), Packet::Roster { .. }));

        let second = raw_socket();
        second.send_to(&hello("b").encode().unwrap(), relay).unwrap();
        match receive(&second) {
            Packet::Disconnected { reason } => assert_eq!(reason, "Server full"),
            other => panic!("Wrong packet type received: {:?}", other),
        }
    }
}
