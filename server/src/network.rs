//! Server network layer handling UDP communications and event dispatch

use crate::client_manager::ClientManager;
use crate::dispatch::{Dispatcher, Outbox, PlayerEvent};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    Shutdown,
}

/// Messages sent from the main loop to the network sender task
#[derive(Debug)]
pub enum OutboundMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    SendToClient { packet: Packet, client_id: u32 },
    BroadcastPacket { packet: Packet },
}

/// [`Outbox`] that queues packets for the network sender task
struct ChannelOutbox<'a> {
    tx: &'a mpsc::UnboundedSender<OutboundMessage>,
}

impl Outbox for ChannelOutbox<'_> {
    fn broadcast(&mut self, packet: Packet) {
        if let Err(e) = self.tx.send(OutboundMessage::BroadcastPacket { packet }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    fn send_to(&mut self, client_id: u32, packet: Packet) {
        if let Err(e) = self
            .tx
            .send(OutboundMessage::SendToClient { packet, client_id })
        {
            error!("Failed to queue packet for client {}: {}", client_id, e);
        }
    }
}

/// Stops a running [`Server`] from another task
#[derive(Clone)]
pub struct ShutdownHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Server loop already stopped");
        }
    }
}

/// Main server coordinating networking and the player store
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    dispatcher: Dispatcher,
    client_timeout: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        max_clients: usize,
        client_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_dispatcher(addr, max_clients, client_timeout, Dispatcher::default()).await
    }

    pub async fn with_dispatcher(
        addr: &str,
        max_clients: usize,
        client_timeout: Duration,
        dispatcher: Dispatcher,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            dispatcher,
            client_timeout,
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    /// Address actually bound, useful when binding to port 0
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut outbound_rx =
            std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::SendToClient { packet, client_id } => {
                        let addr = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addr(client_id)
                        };

                        match addr {
                            Some(addr) => {
                                if let Err(e) =
                                    Self::send_packet_impl(&socket, &packet, addr).await
                                {
                                    error!("Failed to send to client {}: {}", client_id, e);
                                }
                            }
                            None => debug!("Client {} gone, dropping reply", client_id),
                        }
                    }
                    OutboundMessage::BroadcastPacket { packet } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        // Encode once for the whole fan-out
                        let data = match Self::encode_datagram(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to encode broadcast packet: {}", e);
                                continue;
                            }
                        };

                        for (client_id, addr) in client_addrs {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        })
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) -> JoinHandle<()> {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let client_timeout = self.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(client_timeout)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        })
    }

    /// Encodes `packet`, refusing anything a client could not receive whole
    fn encode_datagram(packet: &Packet) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        if data.len() > MAX_PACKET_SIZE {
            return Err(format!(
                "encoded packet is {} bytes, limit is {}",
                data.len(),
                MAX_PACKET_SIZE
            )
            .into());
        }
        Ok(data)
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = Self::encode_datagram(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self
            .outbound_tx
            .send(OutboundMessage::SendPacket { packet, addr })
        {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Runs one event through the dispatcher, queueing whatever it emits
    fn dispatch_event(&mut self, client_id: u32, event: PlayerEvent) {
        let mut outbox = ChannelOutbox {
            tx: &self.outbound_tx,
        };
        self.dispatcher.dispatch(client_id, event, &mut outbox);
    }

    /// Processes incoming packets and updates player state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    let response = Packet::Disconnected {
                        reason: "Protocol version mismatch".to_string(),
                    };
                    self.send_packet(response, addr);
                    return;
                }

                // A reconnect from the same address retires the old identity
                let existing_client_id = {
                    let mut clients = self.clients.write().await;
                    let existing = clients.find_client_by_addr(addr);
                    if let Some(existing_id) = existing {
                        clients.remove_client(&existing_id);
                    }
                    existing
                };

                if let Some(existing_id) = existing_client_id {
                    info!("Retired previous client {} from {}", existing_id, addr);
                    self.dispatch_event(existing_id, PlayerEvent::Disconnect);
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                let response = match client_id {
                    Some(client_id) => Packet::Connected { client_id },
                    None => Packet::Disconnected {
                        reason: "Server full".to_string(),
                    },
                };
                self.send_packet(response, addr);
            }

            Packet::Disconnect => {
                let client_id = {
                    let mut clients = self.clients.write().await;
                    let client_id = clients.find_client_by_addr(addr);
                    if let Some(client_id) = client_id {
                        clients.remove_client(&client_id);
                    }
                    client_id
                };

                if let Some(client_id) = client_id {
                    self.dispatch_event(client_id, PlayerEvent::Disconnect);
                }
            }

            packet => {
                let client_id = {
                    let mut clients = self.clients.write().await;
                    let client_id = clients.find_client_by_addr(addr);
                    if let Some(client_id) = client_id {
                        clients.touch(client_id);
                    }
                    client_id
                };

                let Some(client_id) = client_id else {
                    warn!("Packet from unconnected address {}, ignoring", addr);
                    return;
                };

                if matches!(packet, Packet::Heartbeat) {
                    return;
                }

                match PlayerEvent::from_packet(packet) {
                    Some(event) => self.dispatch_event(client_id, event),
                    None => warn!("Unexpected packet type from client {}", client_id),
                }
            }
        }
    }

    /// Main server loop: handles every event one at a time until shutdown
    ///
    /// On shutdown the network tasks are stopped before returning, so the
    /// socket is released once the `Server` is dropped.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let tasks = [
            self.spawn_network_receiver(),
            self.spawn_network_sender(),
            self.spawn_timeout_checker(),
        ];

        info!("Server started successfully");

        while let Some(message) = self.server_rx.recv().await {
            match message {
                ServerMessage::PacketReceived { packet, addr } => {
                    self.handle_packet(packet, addr).await;
                }
                ServerMessage::ClientTimeout { client_id } => {
                    self.dispatch_event(client_id, PlayerEvent::Disconnect);
                }
                ServerMessage::Shutdown => break,
            }
        }

        info!("Server shutting down");
        for task in tasks {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Network task failed: {}", e);
                }
            }
        }
        Ok(())
    }
}
