//! # Player Sync Client Library
//!
//! A headless client for the sync server. It speaks the same UDP protocol
//! as any game front end would (connect, join, move, reset, query) but has
//! no window and no rendering; it exists to drive and check a running
//! server.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! [`network::SyncClient`] owns the socket, performs the connect handshake
//! and offers one async method per protocol message. Calls that expect an
//! answer (`query_state`, `wait_for_snapshot`) give up after a configurable
//! timeout instead of blocking forever on a lost datagram.
//!
//! ### Scenarios Module (`scenarios`)
//! Reset verification checks: single reset, repeated resets, resets
//! interleaved with movement, and name/color integrity across resets.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::SyncClient;
//! use client::scenarios;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = SyncClient::connect("127.0.0.1:5111", Duration::from_secs(1)).await?;
//!     client.join("AutoTestPlayer").await?;
//!
//!     let id = client.client_id();
//!     client.wait_for_snapshot(|players| players.contains_key(&id)).await?;
//!
//!     let results = scenarios::run_all(&mut client, 10).await?;
//!     let (passed, total) = scenarios::summarize(&results);
//!     println!("{}/{} scenarios passed", passed, total);
//!
//!     client.disconnect().await
//! }
//! ```

pub mod network;
pub mod scenarios;
