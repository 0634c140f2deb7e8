//! Integration tests for the sync server and client
//!
//! These tests run a real server on an ephemeral UDP port and drive it with
//! `SyncClient`, checking what every connected client actually receives.

use assert_approx_eq::assert_approx_eq;
use client::network::SyncClient;
use client::scenarios;
use server::network::{Server, ShutdownHandle};
use shared::{is_valid_color, PlayerState, SPAWN_X, SPAWN_Y};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_test::assert_ok;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

async fn start_server(client_timeout: Duration) -> (SocketAddr, ShutdownHandle) {
    let mut server = Server::new("127.0.0.1:0", 16, client_timeout)
        .await
        .expect("failed to bind server");
    let addr = server.local_addr().unwrap();
    let handle = server.shutdown_handle();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    (addr, handle)
}

async fn connect(addr: SocketAddr) -> SyncClient {
    assert_ok!(SyncClient::connect(&addr.to_string(), REPLY_TIMEOUT).await)
}

/// Connects and joins, returning once the join shows up in a snapshot
async fn join(addr: SocketAddr, name: &str) -> SyncClient {
    let mut client = connect(addr).await;
    assert_ok!(client.join(name).await);

    let id = client.client_id();
    assert_ok!(
        client
            .wait_for_snapshot(|players| players.contains_key(&id))
            .await
    );
    client
}

/// JOIN / MOVE / RESET / DISCONNECT LIFECYCLE
mod lifecycle_tests {
    use super::*;

    /// Walks one player through its whole life while a second client watches
    #[tokio::test]
    async fn join_move_reset_disconnect() {
        let (addr, handle) = start_server(Duration::from_secs(30)).await;

        let mut alice = join(addr, "Alice").await;
        let alice_id = alice.client_id();

        let created = alice.players()[&alice_id].clone();
        assert_eq!(alice.players().len(), 1);
        assert_eq!(created.id, alice_id);
        assert_eq!(created.name, "Alice");
        assert_eq!((created.x, created.y), (SPAWN_X, SPAWN_Y));
        assert_eq!((created.vx, created.vy), (0.0, 0.0));
        assert_eq!(created.color.len(), 7);
        assert!(is_valid_color(&created.color));

        let mut observer = connect(addr).await;

        assert_ok!(alice.move_to(200.0, 250.0).await);
        let seen = assert_ok!(
            observer
                .wait_for_snapshot(|players| players
                    .get(&alice_id)
                    .map_or(false, |p| p.x == 200.0))
                .await
        );
        let moved = &seen[&alice_id];
        assert_approx_eq!(moved.y, 250.0, 0.0001);
        assert_eq!((moved.vx, moved.vy), (0.0, 0.0));
        assert_eq!(moved.name, created.name);
        assert_eq!(moved.color, created.color);

        assert_ok!(alice.reset(None).await);
        let seen = assert_ok!(
            observer
                .wait_for_snapshot(|players| players
                    .get(&alice_id)
                    .map_or(false, |p| p.x == SPAWN_X))
                .await
        );
        let reset = &seen[&alice_id];
        assert_eq!((reset.x, reset.y, reset.vx, reset.vy), (SPAWN_X, SPAWN_Y, 0.0, 0.0));
        assert_eq!(reset.name, "Alice");
        assert_eq!(reset.color, created.color);

        assert_ok!(alice.disconnect().await);
        let seen = assert_ok!(
            observer
                .wait_for_snapshot(|players| !players.contains_key(&alice_id))
                .await
        );
        assert!(seen.is_empty());

        handle.shutdown();
    }

    /// Two joins produce a snapshot with exactly those two players
    #[tokio::test]
    async fn snapshot_completeness() {
        let (addr, handle) = start_server(Duration::from_secs(30)).await;

        let a = join(addr, "A").await;
        let mut b = join(addr, "B").await;

        let a_id = a.client_id();
        let b_id = b.client_id();
        assert_ne!(a_id, b_id);

        let players = b.players().clone();
        assert_eq!(players.keys().copied().collect::<Vec<_>>(), vec![a_id, b_id]);
        assert_eq!(players[&a_id].name, "A");
        assert_eq!(players[&b_id].name, "B");

        // B's own view through a query agrees with the broadcast
        let state = assert_ok!(b.query_state().await);
        assert_eq!(state, players[&b_id].state());

        handle.shutdown();
    }

    /// An empty join name falls back to the placeholder
    #[tokio::test]
    async fn empty_name_defaults() {
        let (addr, handle) = start_server(Duration::from_secs(30)).await;

        let mut client = join(addr, "").await;
        let state = assert_ok!(client.query_state().await);
        assert_eq!(state.name, "Player");

        handle.shutdown();
    }

    /// Names in the kilobyte range still reach every client in snapshots
    #[tokio::test]
    async fn kilobyte_names_sync() {
        let (addr, handle) = start_server(Duration::from_secs(30)).await;
        let long_a = "a".repeat(5000);
        let long_b = "b".repeat(5000);

        let mut a = join(addr, &long_a).await;
        let mut b = join(addr, &long_b).await;
        let a_id = a.client_id();
        let b_id = b.client_id();

        assert_eq!(b.players()[&a_id].name, long_a);
        assert_eq!(b.players()[&b_id].name, long_b);

        assert_ok!(a.move_to(123.0, 456.0).await);
        for client in [&mut a, &mut b] {
            let seen = assert_ok!(
                client
                    .wait_for_snapshot(|players| players
                        .get(&a_id)
                        .map_or(false, |p| p.x == 123.0))
                    .await
            );
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[&a_id].name, long_a);
        }

        let mut big = connect(addr).await;
        let long_c = "c".repeat(9000);
        assert_ok!(big.join(&long_c).await);
        let state = assert_ok!(big.query_state().await);
        assert_eq!(state.name.len(), 9000);

        handle.shutdown();
    }
}

/// QUERY AND IDENTITY TESTS
mod query_tests {
    use super::*;

    /// A connection that never joined gets the fixed default record
    #[tokio::test]
    async fn query_without_join_returns_default() {
        let (addr, handle) = start_server(Duration::from_secs(30)).await;

        let mut client = connect(addr).await;
        let state = assert_ok!(client.query_state().await);
        assert_eq!(state, PlayerState::default());

        handle.shutdown();
    }

    /// After a player leaves, a fresh connection gets a fresh id and sees
    /// nothing of the old player
    #[tokio::test]
    async fn disconnect_cleanup_and_fresh_identity() {
        let (addr, handle) = start_server(Duration::from_secs(30)).await;

        let gone = join(addr, "Leaver").await;
        let gone_id = gone.client_id();
        assert_ok!(gone.disconnect().await);

        let mut fresh = connect(addr).await;
        assert!(fresh.client_id() > gone_id);

        let state = assert_ok!(fresh.query_state().await);
        assert_eq!(state, PlayerState::default());

        handle.shutdown();
    }

    /// Unregistered moves do not create a player
    #[tokio::test]
    async fn move_without_join_is_ignored() {
        let (addr, handle) = start_server(Duration::from_secs(30)).await;

        let mut client = connect(addr).await;
        assert_ok!(client.move_to(10.0, 10.0).await);
        assert_ok!(client.reset(Some("no player yet")).await);

        let state = assert_ok!(client.query_state().await);
        assert_eq!(state, PlayerState::default());
        assert!(client.players().is_empty());

        handle.shutdown();
    }

    /// Moves from a connection that never joined reach nobody
    #[tokio::test]
    async fn unjoined_moves_do_not_broadcast() {
        let (addr, handle) = start_server(Duration::from_secs(30)).await;

        let mut watcher = join(addr, "Watcher").await;
        let mut stranger = connect(addr).await;

        for i in 0..3 {
            assert_ok!(stranger.move_to(i as f32, i as f32).await);
        }
        // The reply comes after the moves have been handled
        assert_ok!(stranger.query_state().await);

        let result = watcher.wait_for_snapshot(|_| true).await;
        assert!(result.is_err(), "watcher got a snapshot from unjoined moves");

        handle.shutdown();
    }
}

/// RESET VERIFICATION TESTS
mod reset_tests {
    use super::*;

    /// The reset verification scenarios all pass against a real server
    #[tokio::test]
    async fn reset_scenarios_pass() {
        let (addr, handle) = start_server(Duration::from_secs(30)).await;

        let mut client = join(addr, "AutoTestPlayer").await;
        let results = assert_ok!(scenarios::run_all(&mut client, 5).await);

        for result in &results {
            assert!(result.passed, "{} failed: {}", result.name, result.detail);
        }
        assert_eq!(scenarios::summarize(&results), (4, 4));

        handle.shutdown();
    }

    /// A second join re-initializes the player under the same id
    #[tokio::test]
    async fn rejoin_reinitializes() {
        let (addr, handle) = start_server(Duration::from_secs(30)).await;

        let mut client = join(addr, "Before").await;
        let id = client.client_id();

        assert_ok!(client.move_to(321.0, 123.0).await);
        assert_ok!(client.join("After").await);

        let players = assert_ok!(
            client
                .wait_for_snapshot(|players| players
                    .get(&id)
                    .map_or(false, |p| p.name == "After"))
                .await
        );
        assert_eq!(players.len(), 1);
        assert_eq!((players[&id].x, players[&id].y), (SPAWN_X, SPAWN_Y));

        handle.shutdown();
    }
}

/// CONNECTION HEALTH TESTS
mod timeout_tests {
    use super::*;

    /// A client that goes silent is dropped and its player removed
    #[tokio::test]
    async fn silent_client_times_out() {
        let (addr, handle) = start_server(Duration::from_secs(1)).await;

        let victim = join(addr, "Silent").await;
        let victim_id = victim.client_id();

        let mut observer = assert_ok!(
            SyncClient::connect(&addr.to_string(), Duration::from_millis(300)).await
        );

        let deadline = Instant::now() + Duration::from_secs(6);
        let mut removed = false;
        while Instant::now() < deadline {
            assert_ok!(observer.heartbeat().await);
            if observer
                .wait_for_snapshot(|players| !players.contains_key(&victim_id))
                .await
                .is_ok()
            {
                removed = true;
                break;
            }
        }

        assert!(removed, "silent client {} was never removed", victim_id);
        drop(victim);

        handle.shutdown();
    }

    /// Heartbeats keep an otherwise idle client connected
    #[tokio::test]
    async fn heartbeat_keeps_client_alive() {
        let (addr, handle) = start_server(Duration::from_secs(1)).await;

        let mut client = join(addr, "Alive").await;
        for _ in 0..6 {
            sleep(Duration::from_millis(400)).await;
            assert_ok!(client.heartbeat().await);
        }

        let state = assert_ok!(client.query_state().await);
        assert_eq!(state.name, "Alive");

        handle.shutdown();
    }
}
