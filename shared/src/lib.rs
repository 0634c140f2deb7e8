use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PROTOCOL_VERSION: u32 = 1;
pub const SPAWN_X: f32 = 50.0;
pub const SPAWN_Y: f32 = 300.0;
pub const DEFAULT_PLAYER_NAME: &str = "Player";
/// Largest value a generated color can take (24-bit RGB)
pub const MAX_COLOR: u32 = 0xFF_FFFF;
/// Largest UDP payload over IPv4, and the receive buffer size on both ends
pub const MAX_PACKET_SIZE: usize = 65_507;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Join {
        name: String,
    },
    Move {
        x: f32,
        y: f32,
    },
    Reset {
        reason: Option<String>,
    },
    Query,
    Heartbeat,
    Disconnect,

    Connected {
        client_id: u32,
    },
    Players {
        players: BTreeMap<u32, PlayerRecord>,
    },
    PlayerState(PlayerState),
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: u32,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub color: String,
}

impl PlayerRecord {
    /// Builds a record at the spawn point with zero velocity.
    ///
    /// An empty `name` falls back to [`DEFAULT_PLAYER_NAME`].
    pub fn spawn(id: u32, name: &str, color: String) -> Self {
        let name = if name.is_empty() {
            DEFAULT_PLAYER_NAME.to_string()
        } else {
            name.to_string()
        };

        Self {
            id,
            name,
            x: SPAWN_X,
            y: SPAWN_Y,
            vx: 0.0,
            vy: 0.0,
            color,
        }
    }

    /// Puts position and velocity back to the spawn defaults.
    pub fn reset_motion(&mut self) {
        self.x = SPAWN_X;
        self.y = SPAWN_Y;
        self.vx = 0.0;
        self.vy = 0.0;
    }

    pub fn state(&self) -> PlayerState {
        PlayerState {
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
            name: self.name.clone(),
            color: self.color.clone(),
        }
    }
}

/// Reply to a `Query`. `Default` is the reply for a connection with no player.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct PlayerState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub name: String,
    pub color: String,
}

impl PlayerState {
    pub fn is_at_spawn(&self) -> bool {
        self.x == SPAWN_X && self.y == SPAWN_Y && self.vx == 0.0 && self.vy == 0.0
    }
}

/// Whether `packet` still fits in a single datagram once encoded.
pub fn fits_in_datagram(packet: &Packet) -> bool {
    bincode::serialized_size(packet).map_or(false, |size| size <= MAX_PACKET_SIZE as u64)
}

/// Formats a 24-bit value as `#rrggbb`.
///
/// Always zero-pads to six digits so the result is exactly 7 characters,
/// including for values below `0x100000`. Bits above 24 are masked off.
pub fn format_color(value: u32) -> String {
    format!("#{:06x}", value & MAX_COLOR)
}

/// Checks that `color` is `#` followed by exactly six lowercase hex digits.
pub fn is_valid_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_player_spawn() {
        let player = PlayerRecord::spawn(1, "Alice", "#00ff00".to_string());
        assert_eq!(player.id, 1);
        assert_eq!(player.name, "Alice");
        assert_eq!(player.x, SPAWN_X);
        assert_eq!(player.y, SPAWN_Y);
        assert_eq!(player.vx, 0.0);
        assert_eq!(player.vy, 0.0);
        assert_eq!(player.color, "#00ff00");
    }

    #[test]
    fn test_player_spawn_empty_name_uses_default() {
        let player = PlayerRecord::spawn(7, "", "#123456".to_string());
        assert_eq!(player.name, DEFAULT_PLAYER_NAME);
    }

    #[test]
    fn test_reset_motion_leaves_identity_alone() {
        let mut player = PlayerRecord::spawn(3, "Bob", "#abcdef".to_string());
        player.x = -12.5;
        player.y = 9000.0;
        player.vx = 4.0;
        player.vy = -8.0;

        player.reset_motion();

        assert_approx_eq!(player.x, 50.0, 0.0001);
        assert_approx_eq!(player.y, 300.0, 0.0001);
        assert_eq!(player.vx, 0.0);
        assert_eq!(player.vy, 0.0);
        assert_eq!(player.id, 3);
        assert_eq!(player.name, "Bob");
        assert_eq!(player.color, "#abcdef");
    }

    #[test]
    fn test_state_copies_fields() {
        let mut player = PlayerRecord::spawn(2, "Carol", "#0a0b0c".to_string());
        player.x = 200.0;
        player.y = 250.0;

        let state = player.state();
        assert_eq!(state.x, 200.0);
        assert_eq!(state.y, 250.0);
        assert_eq!(state.name, "Carol");
        assert_eq!(state.color, "#0a0b0c");
        assert!(!state.is_at_spawn());
    }

    #[test]
    fn test_default_player_state() {
        let state = PlayerState::default();
        assert_eq!(state.x, 0.0);
        assert_eq!(state.y, 0.0);
        assert_eq!(state.vx, 0.0);
        assert_eq!(state.vy, 0.0);
        assert_eq!(state.name, "");
        assert_eq!(state.color, "");
    }

    #[test]
    fn test_format_color_pads_small_values() {
        assert_eq!(format_color(0), "#000000");
        assert_eq!(format_color(0xf), "#00000f");
        assert_eq!(format_color(0x0fffff), "#0fffff");
        assert_eq!(format_color(0x100000), "#100000");
    }

    #[test]
    fn test_format_color_upper_bound() {
        assert_eq!(format_color(MAX_COLOR), "#ffffff");
        // Out-of-range input must never grow the string
        assert_eq!(format_color(0x1ff_ffff), "#ffffff");
        assert_eq!(format_color(u32::MAX).len(), 7);
    }

    #[test]
    fn test_is_valid_color() {
        assert!(is_valid_color("#00000f"));
        assert!(is_valid_color("#abcdef"));
        assert!(!is_valid_color("#ABCDEF"));
        assert!(!is_valid_color("#fff"));
        assert!(!is_valid_color("#abcdef#abcdef"));
        assert!(!is_valid_color("0abcdef"));
        assert!(!is_valid_color(""));
    }

    #[test]
    fn test_packet_serialization_join() {
        let packet = Packet::Join {
            name: "Ünïcødé 🚀".to_string(),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Join { name } => assert_eq!(name, "Ünïcødé 🚀"),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_players() {
        let mut players = BTreeMap::new();
        players.insert(1, PlayerRecord::spawn(1, "Alice", "#000001".to_string()));
        players.insert(2, PlayerRecord::spawn(2, "Bob", "#000002".to_string()));

        let packet = Packet::Players { players };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Players { players } => {
                assert_eq!(players.len(), 2);
                assert_eq!(players[&1].name, "Alice");
                assert_eq!(players[&2].color, "#000002");
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_fits_in_datagram() {
        let small = Packet::Join {
            name: "Alice".to_string(),
        };
        assert!(fits_in_datagram(&small));

        let mut players = BTreeMap::new();
        for id in 0..4 {
            let name = "n".repeat(20_000);
            players.insert(id, PlayerRecord::spawn(id, &name, "#000000".to_string()));
        }
        let oversized = Packet::Players { players };
        assert!(bincode::serialize(&oversized).unwrap().len() > MAX_PACKET_SIZE);
        assert!(!fits_in_datagram(&oversized));
    }

    #[test]
    fn test_truncated_packet_is_rejected() {
        let packet = Packet::Move { x: 1.0, y: 2.0 };
        let serialized = bincode::serialize(&packet).unwrap();

        let result: Result<Packet, _> = bincode::deserialize(&serialized[..serialized.len() - 2]);
        assert!(result.is_err());
    }
}
