//! Authoritative player state for every registered connection
//!
//! The store is a plain owned value: the server loop holds the only instance
//! and all mutation goes through `&mut self`, so no locking is involved.
//! Every operation is total over the identity space. Asking about a
//! connection that never joined is a no-op or an absent result, never an
//! error.

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{format_color, PlayerRecord, MAX_COLOR};
use std::collections::BTreeMap;

/// Result of [`PlayerStore::create`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// A record already existed for the connection and was replaced
    Reinitialized,
}

pub struct PlayerStore {
    players: BTreeMap<u32, PlayerRecord>,
    rng: StdRng,
}

impl PlayerStore {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates a store whose color sequence is reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            players: BTreeMap::new(),
            rng,
        }
    }

    /// Spawns a player for `client_id`.
    ///
    /// A second call for the same connection throws away the old record and
    /// starts over with a new color at the spawn point.
    pub fn create(
        &mut self,
        client_id: u32,
        requested_name: &str,
    ) -> (CreateOutcome, &PlayerRecord) {
        let color = self.generate_color();
        let record = PlayerRecord::spawn(client_id, requested_name, color);

        info!(
            "Creating player {}: name \"{}\" ({} chars), color \"{}\" ({} chars)",
            client_id,
            record.name,
            record.name.chars().count(),
            record.color,
            record.color.len()
        );

        let outcome = match self.players.insert(client_id, record) {
            Some(previous) => {
                info!(
                    "Player {} joined again, re-initialized (was \"{}\" {})",
                    client_id, previous.name, previous.color
                );
                CreateOutcome::Reinitialized
            }
            None => CreateOutcome::Created,
        };

        (outcome, &self.players[&client_id])
    }

    /// Stores the last reported position. Velocity is left untouched.
    pub fn update_position(&mut self, client_id: u32, x: f32, y: f32) -> bool {
        match self.players.get_mut(&client_id) {
            Some(player) => {
                player.x = x;
                player.y = y;
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self, client_id: u32) -> bool {
        match self.players.get_mut(&client_id) {
            Some(player) => {
                player.reset_motion();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, client_id: u32) -> Option<&PlayerRecord> {
        self.players.get(&client_id)
    }

    pub fn remove(&mut self, client_id: u32) -> Option<PlayerRecord> {
        let removed = self.players.remove(&client_id);
        if removed.is_some() {
            info!("Removed player {}", client_id);
        }
        removed
    }

    /// Copy of every record as of this call, keyed by connection id.
    pub fn snapshot(&self) -> BTreeMap<u32, PlayerRecord> {
        self.players.clone()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    fn generate_color(&mut self) -> String {
        format_color(self.rng.gen_range(0..=MAX_COLOR))
    }
}

impl Default for PlayerStore {
    fn default() -> Self {
        Self::new()
    }
}
