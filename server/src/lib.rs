//! # Player Sync Server Library
//!
//! This library provides the authoritative server for the shared player
//! world. It holds the canonical record of every joined player, applies the
//! events clients send, and broadcasts the full world state after every
//! change so all connected clients see the same thing.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! The server stores whatever position each client last reported. It never
//! simulates motion: there is no physics step, no collision and no
//! validation of reported positions. Velocity fields exist in the record but
//! are only ever zero (set at spawn and again on reset).
//!
//! ### Client Management
//! Handles the lifecycle of client connections:
//! - Connection handshake and identity assignment
//! - Player creation on join, removal on disconnect
//! - Timeout detection for clients that vanish without saying goodbye
//!
//! ### State Broadcasting
//! Every join, move, reset and disconnect is followed by a snapshot of the
//! whole store sent to every connected client. Queries are answered to the
//! asking client only.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All inbound events, from every connection, go through one loop that owns
//! the player store outright. Only one event is ever being applied at a
//! time, so the store needs no lock and every snapshot is consistent.
//! Socket reads, socket writes and timeout checks run as separate tasks
//! that talk to the loop over channels.
//!
//! ### UDP-Based Communication
//! Packets are bincode-encoded `shared::Packet` values over UDP. A session
//! starts with `Connect`, is kept alive by any traffic (including
//! `Heartbeat`), and ends with `Disconnect` or a timeout.
//!
//! ## Module Organization
//!
//! ### Store Module (`store`)
//! The player state store: create, move, reset, lookup, removal and
//! snapshots, plus color generation.
//!
//! ### Dispatch Module (`dispatch`)
//! Maps client events onto store operations and decides whether the result
//! is broadcast or sent back to the requester.
//!
//! ### Client Manager Module (`client_manager`)
//! Session bookkeeping: ids, addresses, capacity and timeouts.
//!
//! ### Network Module (`network`)
//! Socket tasks, the connect handshake and the main event loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Up to 64 clients, dropped after 10 seconds of silence
//!     let mut server = Server::new("127.0.0.1:5111", 64, Duration::from_secs(10)).await?;
//!
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod dispatch;
pub mod network;
pub mod store;
