//! The connection manager: one logical channel to the relay per process.
//!
//! Sending is fire-and-forget. A failed open or a closed channel is logged
//! and the packet is dropped; the next send or subscribe tries to connect
//! again. Inbound packets are dispatched to the handlers subscribed to their
//! [`EventKind`].
//!
//! A relay that refuses registration outright (full, wrong version) is left
//! alone for [`RETRY_DELAY`] before the next attempt. A relay that forgot an
//! already registered client is asked again right away.

use log::{debug, error, info, warn};
use shared::{EventKind, Packet, Player, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::ClientError;

pub type Handler = Box<dyn FnMut(&Packet) + Send>;
pub type SubscriptionId = u64;

/// How long to stay away after the relay refused to register us.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// An open transport: a queue towards the relay and a queue back from it.
pub struct Channel {
    outbound: mpsc::UnboundedSender<Packet>,
    inbound: mpsc::UnboundedReceiver<Packet>,
    reader: Option<JoinHandle<()>>,
}

impl Channel {
    pub fn new(
        outbound: mpsc::UnboundedSender<Packet>,
        inbound: mpsc::UnboundedReceiver<Packet>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            reader: None,
        }
    }

    /// Attaches the task feeding `inbound`, aborted when the channel closes.
    pub fn with_reader(mut self, reader: JoinHandle<()>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Dropping the outbound queue lets the writer flush what is queued and
    /// exit on its own.
    fn close(self) {
        if let Some(reader) = self.reader {
            reader.abort();
        }
    }
}

/// Opens channels to the relay.
pub trait Connector {
    fn open(&mut self) -> Result<Channel, ClientError>;
}

/// Connects over UDP, one bincode-encoded packet per datagram.
///
/// `open` spawns tasks and so must be called from within a tokio runtime.
pub struct UdpConnector {
    relay: SocketAddr,
}

impl UdpConnector {
    pub fn new(relay: &str) -> Result<Self, ClientError> {
        Ok(Self {
            relay: relay.parse()?,
        })
    }

    pub fn relay(&self) -> SocketAddr {
        self.relay
    }
}

impl Connector for UdpConnector {
    fn open(&mut self) -> Result<Channel, ClientError> {
        let bind_addr = if self.relay.is_ipv6() {
            "[::]:0"
        } else {
            "0.0.0.0:0"
        };
        let std_socket = std::net::UdpSocket::bind(bind_addr)?;
        std_socket.set_nonblocking(true)?;
        let socket = Arc::new(UdpSocket::from_std(std_socket)?);
        info!("Opened {} towards relay {}", socket.local_addr()?, self.relay);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Packet>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let relay = self.relay;

        let reader = {
            let socket = Arc::clone(&socket);
            tokio::spawn(async move {
                let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
                loop {
                    match socket.recv_from(&mut buffer).await {
                        Ok((len, from)) if from == relay => match Packet::decode(&buffer[..len]) {
                            Ok(packet) => {
                                if in_tx.send(packet).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Dropping datagram from relay: {}", e),
                        },
                        Ok((_, from)) => debug!("Ignoring datagram from {}", from),
                        Err(e) => {
                            error!("Error receiving packet: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }
            })
        };

        tokio::spawn(async move {
            while let Some(packet) = out_rx.recv().await {
                let data = match packet.encode() {
                    Ok(data) => data,
                    Err(e) => {
                        warn!("Dropping {:?}: {}", packet.kind(), e);
                        continue;
                    }
                };
                if let Err(e) = socket.send_to(&data, relay).await {
                    debug!("Failed to send {:?}: {}", packet.kind(), e);
                }
            }
        });

        Ok(Channel::new(out_tx, in_rx).with_reader(reader))
    }
}

pub struct ConnectionManager<C> {
    connector: C,
    player: Player,
    channel: Option<Channel>,
    connection_id: Option<u32>,
    handlers: Vec<(SubscriptionId, EventKind, Handler)>,
    next_subscription: SubscriptionId,
    retry_delay: Duration,
    refused_at: Option<Instant>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, player: Player) -> Self {
        Self {
            connector,
            player,
            channel: None,
            connection_id: None,
            handlers: Vec::new(),
            next_subscription: 1,
            retry_delay: RETRY_DELAY,
            refused_at: None,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Opens the channel unless it is already open, then registers with the
    /// relay.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        if self.channel.is_some() {
            return Ok(());
        }
        if let Some(refused_at) = self.refused_at {
            let waited = refused_at.elapsed();
            if waited < self.retry_delay {
                return Err(ClientError::Refused(self.retry_delay - waited));
            }
            self.refused_at = None;
        }

        let channel = self.connector.open()?;
        let hello = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            player: self.player.clone(),
        };
        if channel.outbound.send(hello).is_err() {
            warn!("Channel closed before registering");
        }
        info!("Connecting as {} ({})", self.player.username, self.player.id);
        self.channel = Some(channel);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Relay-assigned id, once `Connected` has arrived.
    pub fn connection_id(&self) -> Option<u32> {
        self.connection_id
    }

    pub fn send(&mut self, packet: Packet) {
        match self.connect() {
            Ok(()) => {}
            Err(e @ ClientError::Refused(_)) => {
                debug!("Dropping {:?}: {}", packet.kind(), e);
                return;
            }
            Err(e) => {
                warn!("Dropping {:?}, cannot connect: {}", packet.kind(), e);
                return;
            }
        }
        let Some(channel) = self.channel.as_ref() else {
            return;
        };

        if let Err(e) = channel.outbound.send(packet) {
            debug!("Dropping {:?}, channel closed", e.0.kind());
            self.drop_channel();
        }
    }

    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&Packet) + Send + 'static,
    {
        if let Err(e) = self.connect() {
            warn!("Subscribed to {:?} while offline: {}", kind, e);
        }

        let id = self.next_subscription;
        self.next_subscription += 1;
        self.handlers.push((id, kind, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _, _)| *handler_id != id);
        self.handlers.len() != before
    }

    /// Says goodbye to the relay, closes the channel and drops every
    /// subscription.
    pub fn disconnect(&mut self) {
        if let Some(channel) = self.channel.as_ref() {
            let _ = channel.outbound.send(Packet::Disconnect);
        }
        self.drop_channel();
        self.handlers.clear();
        info!("Disconnected from relay");
    }

    /// Waits for the next inbound packet and dispatches it. Returns None when
    /// the channel was lost; never resolves while disconnected.
    pub async fn next_event(&mut self) -> Option<Packet> {
        let received = match self.channel.as_mut() {
            Some(channel) => channel.inbound.recv().await,
            None => std::future::pending().await,
        };

        match received {
            Some(packet) => {
                self.dispatch(&packet);
                Some(packet)
            }
            None => {
                warn!("Connection to relay lost");
                self.drop_channel();
                None
            }
        }
    }

    /// Dispatches everything already queued without waiting.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        loop {
            let Some(channel) = self.channel.as_mut() else {
                break;
            };
            match channel.inbound.try_recv() {
                Ok(packet) => {
                    self.dispatch(&packet);
                    count += 1;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    warn!("Connection to relay lost");
                    self.drop_channel();
                    break;
                }
            }
        }
        count
    }

    fn dispatch(&mut self, packet: &Packet) {
        let kind = packet.kind();
        match packet {
            Packet::Connected { connection_id } => {
                info!("Registered with relay as connection {}", connection_id);
                self.connection_id = Some(*connection_id);
            }
            Packet::Disconnected { reason } if self.connection_id.is_none() => {
                warn!("Relay refused registration: {}", reason);
                self.refused_at = Some(Instant::now());
            }
            Packet::Disconnected { reason } => {
                info!("Relay dropped our registration: {}", reason);
            }
            _ => {}
        }

        for (_, _, handler) in self.handlers.iter_mut().filter(|(_, k, _)| *k == kind) {
            handler(packet);
        }

        if kind == EventKind::Disconnected {
            self.drop_channel();
        }
    }

    fn drop_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.connection_id = None;
    }
}
