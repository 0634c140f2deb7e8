use bincode::{deserialize, serialize};
use log::{debug, info, warn};
use shared::{Packet, PlayerRecord, PlayerState, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

/// Headless connection to a sync server
///
/// Every call that expects an answer waits at most `reply_timeout`.
/// Snapshots that arrive while waiting for something else are kept, so
/// [`SyncClient::players`] always reflects the latest broadcast seen.
pub struct SyncClient {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: u32,
    reply_timeout: Duration,
    players: BTreeMap<u32, PlayerRecord>,
}

impl SyncClient {
    /// Performs the connect handshake and returns once an id is assigned.
    pub async fn connect(
        server_addr: &str,
        reply_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr: SocketAddr = server_addr.parse()?;

        info!("Connecting to server at {}...", server_addr);

        let data = serialize(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
        })?;
        socket.send_to(&data, server_addr).await?;

        let deadline = Instant::now() + reply_timeout;
        let mut buffer = vec![0u8; MAX_PACKET_SIZE];

        loop {
            let (len, _) = timeout_at(deadline, socket.recv_from(&mut buffer))
                .await
                .map_err(|_| "timed out waiting for connection")??;

            match deserialize::<Packet>(&buffer[..len]) {
                Ok(Packet::Connected { client_id }) => {
                    info!("Connected! Client ID: {}", client_id);
                    return Ok(Self {
                        socket,
                        server_addr,
                        client_id,
                        reply_timeout,
                        players: BTreeMap::new(),
                    });
                }
                Ok(Packet::Disconnected { reason }) => {
                    return Err(format!("connection refused: {}", reason).into());
                }
                Ok(other) => debug!("Ignoring {:?} before handshake", other),
                Err(e) => warn!("Undecodable packet from server: {}", e),
            }
        }
    }

    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// Most recent snapshot received from the server
    pub fn players(&self) -> &BTreeMap<u32, PlayerRecord> {
        &self.players
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Receives the next packet, recording it if it is a snapshot.
    async fn recv_packet(&mut self, deadline: Instant) -> Result<Packet, Box<dyn std::error::Error>> {
        let mut buffer = vec![0u8; MAX_PACKET_SIZE];

        loop {
            let (len, _) = timeout_at(deadline, self.socket.recv_from(&mut buffer))
                .await
                .map_err(|_| "timed out waiting for server")??;

            match deserialize::<Packet>(&buffer[..len]) {
                Ok(Packet::Players { players }) => {
                    self.players = players.clone();
                    return Ok(Packet::Players { players });
                }
                Ok(Packet::Disconnected { reason }) => {
                    return Err(format!("disconnected by server: {}", reason).into());
                }
                Ok(packet) => return Ok(packet),
                Err(e) => warn!("Undecodable packet from server: {}", e),
            }
        }
    }

    pub async fn join(&self, name: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.send_packet(&Packet::Join {
            name: name.to_string(),
        })
        .await
    }

    pub async fn move_to(&self, x: f32, y: f32) -> Result<(), Box<dyn std::error::Error>> {
        self.send_packet(&Packet::Move { x, y }).await
    }

    pub async fn reset(&self, reason: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
        self.send_packet(&Packet::Reset {
            reason: reason.map(str::to_string),
        })
        .await
    }

    pub async fn heartbeat(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.send_packet(&Packet::Heartbeat).await
    }

    /// Asks for this connection's player and waits for the reply.
    pub async fn query_state(&mut self) -> Result<PlayerState, Box<dyn std::error::Error>> {
        self.send_packet(&Packet::Query).await?;

        let deadline = Instant::now() + self.reply_timeout;
        loop {
            if let Packet::PlayerState(state) = self.recv_packet(deadline).await? {
                return Ok(state);
            }
        }
    }

    /// Waits until a snapshot satisfying `predicate` arrives.
    pub async fn wait_for_snapshot<F>(
        &mut self,
        predicate: F,
    ) -> Result<BTreeMap<u32, PlayerRecord>, Box<dyn std::error::Error>>
    where
        F: Fn(&BTreeMap<u32, PlayerRecord>) -> bool,
    {
        let deadline = Instant::now() + self.reply_timeout;
        loop {
            if let Packet::Players { players } = self.recv_packet(deadline).await? {
                if predicate(&players) {
                    return Ok(players);
                }
            }
        }
    }

    pub async fn disconnect(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Client {} disconnecting", self.client_id);
        self.send_packet(&Packet::Disconnect).await
    }
}
