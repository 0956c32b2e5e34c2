//! Relay network layer: UDP communication and packet routing

use crate::client_manager::ClientManager;
use log::{debug, error, info, warn};
use shared::{Packet, Player, PresenceStatus, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Reason sent to an address that talks to the relay without registering.
pub const NOT_REGISTERED: &str = "Not registered";

/// Messages sent from network tasks to the main relay loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32, player_id: String },
}

/// Messages sent from the main relay loop to the sender task
#[derive(Debug)]
pub enum Outbound {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub max_clients: usize,
    pub client_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_clients: 64,
            client_timeout: Duration::from_secs(10),
        }
    }
}

/// The relay: registers players, pushes rosters and routes game traffic
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    config: RelayConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    out_tx: mpsc::UnboundedSender<Outbound>,
    out_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Server {
    pub async fn new(addr: &str, config: RelayConfig) -> Result<Self, BoxError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Relay listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            config,
            server_tx,
            server_rx,
            out_tx,
            out_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping datagram from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                match message {
                    Outbound::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    Outbound::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that evicts silent clients
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.config.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client in timed_out {
                    let message = ServerMessage::ClientTimeout {
                        client_id: client.id,
                        player_id: client.player.id,
                    };
                    if let Err(e) = server_tx.send(message) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), BoxError> {
        let data = packet.encode()?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.out_tx.send(Outbound::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self.out_tx.send(Outbound::BroadcastPacket { packet, exclude }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    async fn broadcast_roster(&self) {
        let players = {
            let clients = self.clients.read().await;
            clients.roster()
        };
        debug!("Pushing roster of {} players", players.len());
        self.broadcast_packet(Packet::Roster { players }, None);
    }

    /// Routes one incoming packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect {
            client_version,
            player,
        } = packet
        {
            self.handle_connect(client_version, player, addr).await;
            return;
        }

        let sender = {
            let mut clients = self.clients.write().await;
            clients.touch(addr)
        };
        let Some(sender) = sender else {
            warn!("Dropping {:?} from unregistered address {}", packet.kind(), addr);
            if !matches!(packet, Packet::Disconnect) {
                // Evicted or forgotten after a restart; make the client register again
                self.send_packet(
                    Packet::Disconnected {
                        reason: NOT_REGISTERED.to_string(),
                    },
                    addr,
                );
            }
            return;
        };

        match packet {
            Packet::Heartbeat => {}

            Packet::Presence { player_id, status } => {
                let changed = {
                    let mut clients = self.clients.write().await;
                    let owned = clients
                        .get(sender)
                        .map_or(false, |client| client.player.id == player_id);
                    if owned {
                        clients.set_status(sender, status)
                    } else {
                        warn!("Presence for {} sent from {}", player_id, addr);
                        false
                    }
                };
                if changed {
                    info!("{} is now {}", player_id, status);
                    self.broadcast_roster().await;
                }
            }

            Packet::Disconnect => {
                let removed = {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&sender)
                };
                if removed.is_some() {
                    self.broadcast_roster().await;
                }
            }

            Packet::Move(mv) => {
                debug!("Fanning out {} move {} from {}", mv.kind(), mv.id, mv.player_id);
                self.broadcast_packet(Packet::Move(mv), Some(sender));
            }

            addressed @ (Packet::Invite(_)
            | Packet::InviteAccepted { .. }
            | Packet::InviteRejected { .. }
            | Packet::SessionConfirmed { .. }
            | Packet::SessionClosed { .. }) => {
                self.forward(addressed).await;
            }

            other => {
                warn!("Unexpected {:?} from client {}", other.kind(), sender);
            }
        }
    }

    async fn handle_connect(&mut self, client_version: u32, mut player: Player, addr: SocketAddr) {
        info!(
            "Player {} connecting from {} (version: {})",
            player.id, addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            );
            return;
        }

        player.status = PresenceStatus::Online;

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr, player)
        };

        match client_id {
            Some(connection_id) => {
                self.send_packet(Packet::Connected { connection_id }, addr);
                self.broadcast_roster().await;
            }
            None => {
                self.send_packet(
                    Packet::Disconnected {
                        reason: "Server full".to_string(),
                    },
                    addr,
                );
                // A replaced registration may have left the roster
                self.broadcast_roster().await;
            }
        }
    }

    /// Delivers a packet to the single player it is addressed to.
    async fn forward(&self, packet: Packet) {
        let Some(recipient) = packet.recipient() else {
            return;
        };

        let addr = {
            let clients = self.clients.read().await;
            clients.find_client_by_player(recipient).map(|client| client.addr)
        };

        match addr {
            Some(addr) => self.send_packet(packet, addr),
            None => debug!("No connected player {} for {:?}", recipient, packet.kind()),
        }
    }

    /// Main relay loop
    pub async fn run(&mut self) -> Result<(), BoxError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Relay started successfully");

        loop {
            match self.server_rx.recv().await {
                Some(ServerMessage::PacketReceived { packet, addr }) => {
                    self.handle_packet(packet, addr).await;
                }
                Some(ServerMessage::ClientTimeout {
                    client_id,
                    player_id,
                }) => {
                    info!("Client {} ({}) timed out", client_id, player_id);
                    self.broadcast_roster().await;
                }
                None => {
                    info!("Relay shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{GameKind, Invite, Move, MoveAction};
    use uuid::Uuid;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    async fn test_server() -> Server {
        Server::new("127.0.0.1:0", RelayConfig::default())
            .await
            .unwrap()
    }

    fn drain(server: &mut Server) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(message) = server.out_rx.try_recv() {
            out.push(message);
        }
        out
    }

    async fn register(server: &mut Server, id: &str, port: u16) {
        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                    player: Player::new(id, id.to_uppercase()),
                },
                addr(port),
            )
            .await;
    }

    #[tokio::test]
    async fn test_connect_answers_and_pushes_roster() {
        let mut server = test_server().await;
        register(&mut server, "alice", 9001).await;

        let out = drain(&mut server);
        assert_eq!(out.len(), 2);
        match &out[0] {
            Outbound::SendPacket {
                packet: Packet::Connected { connection_id },
                addr: to,
            } => {
                assert_eq!(*connection_id, 1);
                assert_eq!(*to, addr(9001));
            }
            other => panic!("Unexpected message: {:?}", other),
        }
        match &out[1] {
            Outbound::BroadcastPacket {
                packet: Packet::Roster { players },
                exclude: None,
            } => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].id, "alice");
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_version_mismatch_is_refused() {
        let mut server = test_server().await;
        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION + 1,
                    player: Player::new("alice", "Alice"),
                },
                addr(9001),
            )
            .await;

        let out = drain(&mut server);
        assert_eq!(out.len(), 1);
        assert!(matches!(
            &out[0],
            Outbound::SendPacket {
                packet: Packet::Disconnected { .. },
                ..
            }
        ));
        assert!(server.clients.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_server_full() {
        let mut server = Server::new(
            "127.0.0.1:0",
            RelayConfig {
                max_clients: 1,
                ..RelayConfig::default()
            },
        )
        .await
        .unwrap();
        register(&mut server, "alice", 9001).await;
        drain(&mut server);

        register(&mut server, "bob", 9002).await;
        let out = drain(&mut server);
        match &out[0] {
            Outbound::SendPacket {
                packet: Packet::Disconnected { reason },
                addr: to,
            } => {
                assert_eq!(reason, "Server full");
                assert_eq!(*to, addr(9002));
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invite_is_forwarded_to_addressee_only() {
        let mut server = test_server().await;
        register(&mut server, "alice", 9001).await;
        register(&mut server, "bob", 9002).await;
        drain(&mut server);

        let invite = Invite::new(
            Player::new("alice", "ALICE"),
            Player::new("bob", "BOB"),
            GameKind::TicTacToe,
            1,
        );
        server
            .handle_packet(Packet::Invite(invite.clone()), addr(9001))
            .await;

        let out = drain(&mut server);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Outbound::SendPacket { packet, addr: to } => {
                assert_eq!(*to, addr(9002));
                assert_eq!(packet, &Packet::Invite(invite));
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_packet_for_unknown_player_is_dropped() {
        let mut server = test_server().await;
        register(&mut server, "alice", 9001).await;
        drain(&mut server);

        server
            .handle_packet(
                Packet::SessionClosed {
                    to: "nobody".into(),
                    session_id: Uuid::new_v4(),
                },
                addr(9001),
            )
            .await;

        assert!(drain(&mut server).is_empty());
    }

    #[tokio::test]
    async fn test_move_is_broadcast_excluding_sender() {
        let mut server = test_server().await;
        register(&mut server, "alice", 9001).await;
        register(&mut server, "bob", 9002).await;
        drain(&mut server);

        let mv = Move::new(Uuid::new_v4(), "alice", MoveAction::Memory { card_id: 2 });
        server.handle_packet(Packet::Move(mv.clone()), addr(9001)).await;

        let out = drain(&mut server);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Outbound::BroadcastPacket { packet, exclude } => {
                assert_eq!(packet, &Packet::Move(mv));
                let alice_id = server.clients.read().await.find_client_by_addr(addr(9001));
                assert_eq!(*exclude, alice_id);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_presence_change_pushes_roster() {
        let mut server = test_server().await;
        register(&mut server, "alice", 9001).await;
        drain(&mut server);

        let presence = Packet::Presence {
            player_id: "alice".into(),
            status: PresenceStatus::InGame,
        };
        server.handle_packet(presence.clone(), addr(9001)).await;
        let out = drain(&mut server);
        match &out[..] {
            [Outbound::BroadcastPacket {
                packet: Packet::Roster { players },
                ..
            }] => assert_eq!(players[0].status, PresenceStatus::InGame),
            other => panic!("Unexpected messages: {:?}", other),
        }

        // Repeating the same status is not news
        server.handle_packet(presence, addr(9001)).await;
        assert!(drain(&mut server).is_empty());
    }

    #[tokio::test]
    async fn test_presence_for_someone_else_is_ignored() {
        let mut server = test_server().await;
        register(&mut server, "alice", 9001).await;
        register(&mut server, "bob", 9002).await;
        drain(&mut server);

        server
            .handle_packet(
                Packet::Presence {
                    player_id: "bob".into(),
                    status: PresenceStatus::Offline,
                },
                addr(9001),
            )
            .await;

        assert!(drain(&mut server).is_empty());
        assert_eq!(server.clients.read().await.roster().len(), 2);
    }

    #[tokio::test]
    async fn test_unregistered_sender_is_told_to_register() {
        let mut server = test_server().await;
        server.handle_packet(Packet::Heartbeat, addr(9005)).await;

        let out = drain(&mut server);
        match &out[..] {
            [Outbound::SendPacket {
                packet: Packet::Disconnected { reason },
                addr: to,
            }] => {
                assert_eq!(reason, NOT_REGISTERED);
                assert_eq!(*to, addr(9005));
            }
            other => panic!("Unexpected messages: {:?}", other),
        }
        assert!(server.clients.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_goodbye_gets_no_reply() {
        let mut server = test_server().await;
        server.handle_packet(Packet::Disconnect, addr(9005)).await;
        assert!(drain(&mut server).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_pushes_roster_without_player() {
        let mut server = test_server().await;
        register(&mut server, "alice", 9001).await;
        register(&mut server, "bob", 9002).await;
        drain(&mut server);

        server.handle_packet(Packet::Disconnect, addr(9002)).await;

        let out = drain(&mut server);
        match &out[..] {
            [Outbound::BroadcastPacket {
                packet: Packet::Roster { players },
                ..
            }] => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].id, "alice");
            }
            other => panic!("Unexpected messages: {:?}", other),
        }
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.max_clients, 64);
        assert_eq!(config.client_timeout, Duration::from_secs(10));
    }
}
