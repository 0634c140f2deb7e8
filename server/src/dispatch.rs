//! Per-connection event dispatch
//!
//! Turns client events into [`PlayerStore`] operations and decides what goes
//! back out. Every mutating event ends with a full snapshot broadcast;
//! queries are answered to the requester only.
//!
//! | Event        | Store operation   | Output                     |
//! |--------------|-------------------|----------------------------|
//! | `Join`       | `create`          | snapshot to all            |
//! | `Move`       | `update_position` | snapshot to all, if joined |
//! | `Reset`      | `reset`           | snapshot to all, if joined |
//! | `Query`      | `get`             | `PlayerState` to requester |
//! | `Disconnect` | `remove`          | snapshot to all            |
//!
//! A join is refused when the resulting snapshot would not fit in one
//! datagram, since no client could decode it.
//!
//! Output goes through the [`Outbox`] trait so the dispatcher never touches
//! a socket.

use crate::store::{CreateOutcome, PlayerStore};
use log::{debug, info, warn};
use shared::{fits_in_datagram, format_color, Packet, PlayerRecord, MAX_PACKET_SIZE};

/// Something a connection asked for (or, for `Disconnect`, something the
/// transport noticed)
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Join { name: String },
    Move { x: f32, y: f32 },
    Reset { reason: Option<String> },
    Query,
    Disconnect,
}

impl PlayerEvent {
    /// Maps a client packet onto an event.
    ///
    /// Session-level packets (`Connect`, `Heartbeat`, `Disconnect`) and
    /// server-only packets are left to the transport and yield `None`.
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::Join { name } => Some(PlayerEvent::Join { name }),
            Packet::Move { x, y } => Some(PlayerEvent::Move { x, y }),
            Packet::Reset { reason } => Some(PlayerEvent::Reset { reason }),
            Packet::Query => Some(PlayerEvent::Query),
            _ => None,
        }
    }
}

/// Where dispatch output is delivered
pub trait Outbox {
    /// Sends to every connected session
    fn broadcast(&mut self, packet: Packet);
    /// Sends to one session only
    fn send_to(&mut self, client_id: u32, packet: Packet);
}

/// Sole owner and mutator of the player store
pub struct Dispatcher {
    store: PlayerStore,
}

impl Dispatcher {
    pub fn new(store: PlayerStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &PlayerStore {
        &self.store
    }

    /// Applies one event from `client_id` and emits the resulting packets.
    ///
    /// Returns false when the event was rejected, in which case nothing was
    /// mutated and nothing was sent. That covers malformed moves, moves and
    /// resets from a connection without a player, and joins whose snapshot
    /// would no longer fit in one datagram.
    pub fn dispatch<O: Outbox + ?Sized>(
        &mut self,
        client_id: u32,
        event: PlayerEvent,
        outbox: &mut O,
    ) -> bool {
        match event {
            PlayerEvent::Join { name } => {
                if !self.join_fits(client_id, &name) {
                    warn!(
                        "Rejecting join from client {}: snapshot with name of {} bytes exceeds {} bytes",
                        client_id,
                        name.len(),
                        MAX_PACKET_SIZE
                    );
                    return false;
                }

                let (outcome, player) = self.store.create(client_id, &name);
                if outcome == CreateOutcome::Reinitialized {
                    info!("Client {} re-joined as \"{}\"", client_id, player.name);
                }
            }

            PlayerEvent::Move { x, y } => {
                if !x.is_finite() || !y.is_finite() {
                    warn!(
                        "Rejecting move from client {}: non-finite position ({}, {})",
                        client_id, x, y
                    );
                    return false;
                }

                if !self.store.update_position(client_id, x, y) {
                    debug!("Move from client {} without a player", client_id);
                    return false;
                }
            }

            PlayerEvent::Reset { reason } => {
                let reason = reason.as_deref().unwrap_or("unknown");
                let Some(before) = self.store.get(client_id).map(PlayerRecord::state) else {
                    warn!(
                        "Reset from client {} without a player, reason: {}",
                        client_id, reason
                    );
                    return false;
                };

                self.store.reset(client_id);
                if let Some(player) = self.store.get(client_id) {
                    info!(
                        "Reset player {} \"{}\" ({} chars), reason: {}; ({}, {}) v=({}, {}) -> ({}, {}) v=({}, {}); color \"{}\" ({} chars)",
                        client_id,
                        player.name,
                        player.name.chars().count(),
                        reason,
                        before.x,
                        before.y,
                        before.vx,
                        before.vy,
                        player.x,
                        player.y,
                        player.vx,
                        player.vy,
                        player.color,
                        player.color.len()
                    );
                }
            }

            PlayerEvent::Query => {
                let state = self
                    .store
                    .get(client_id)
                    .map(PlayerRecord::state)
                    .unwrap_or_default();
                outbox.send_to(client_id, Packet::PlayerState(state));
                return true;
            }

            PlayerEvent::Disconnect => {
                if self.store.remove(client_id).is_none() {
                    debug!("Client {} left without ever joining", client_id);
                }
            }
        }

        self.broadcast_snapshot(outbox);
        true
    }

    /// Whether the snapshot would still fit in one datagram after `client_id`
    /// joins as `name`. Colors always encode to the same length.
    fn join_fits(&self, client_id: u32, name: &str) -> bool {
        let mut players = self.store.snapshot();
        players.insert(
            client_id,
            PlayerRecord::spawn(client_id, name, format_color(0)),
        );
        fits_in_datagram(&Packet::Players { players })
    }

    /// Sends the whole store, as it is right now, to every session.
    pub fn broadcast_snapshot<O: Outbox + ?Sized>(&self, outbox: &mut O) {
        outbox.broadcast(Packet::Players {
            players: self.store.snapshot(),
        });
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(PlayerStore::new())
    }
}
