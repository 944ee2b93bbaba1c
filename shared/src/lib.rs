//! Protocol types, wire codec and map generation shared by the server and
//! every client.
//!
//! Both sides must agree on the map layout for a seed, so the generator lives
//! here rather than in the server.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod codec;
pub mod map;

pub use codec::CodecError;
pub use map::{SpawnArea, Tile, TileMap};

pub const DEFAULT_MAP_SEED: u64 = 12345;
pub const MAP_WIDTH: usize = 50;
pub const MAP_HEIGHT: usize = 50;
pub const TILE_SIZE: f64 = 40.0;
pub const MAX_HEALTH: u32 = 100;
pub const ATTACK_DAMAGE: u32 = 10;
pub const ATTACK_RANGE: f64 = 60.0;
pub const ATTACK_COOLDOWN_MS: u64 = 1000;
pub const SPAWN_RADIUS: u32 = 150;
pub const DEFAULT_COLOR: [u8; 3] = [0, 0, 255];

/// Messages sent by clients.
///
/// Position updates may also arrive as a bare `{"x": .., "y": ..}` object
/// without a `type`; [`decode_client_message`] maps those onto [`ClientMessage::Move`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Register {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },
    Login {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },
    Attack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
    },
    Move {
        x: f64,
        y: f64,
    },
}

impl ClientMessage {
    /// Position carried by the message, if any.
    pub fn position(&self) -> Option<(f64, f64)> {
        match self {
            ClientMessage::Move { x, y } => Some((*x, *y)),
            ClientMessage::Attack {
                x: Some(x),
                y: Some(y),
            } => Some((*x, *y)),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InboundMessage {
    Typed(ClientMessage),
    Position(BarePosition),
}

// Other fields ride along and are ignored. A `type` key means the message
// was meant as a typed one that failed to parse.
#[derive(Deserialize)]
struct BarePosition {
    #[serde(rename = "type", default)]
    kind: Option<serde_json::Value>,
    x: f64,
    y: f64,
}

/// Parses one client payload, accepting the untyped position form.
pub fn decode_client_message(payload: &[u8]) -> Result<ClientMessage, CodecError> {
    match codec::decode::<InboundMessage>(payload)? {
        InboundMessage::Typed(message) => Ok(message),
        InboundMessage::Position(BarePosition { kind: Some(kind), .. }) => Err(CodecError::Malformed(
            serde::de::Error::custom(format!("unknown message type {kind}")),
        )),
        InboundMessage::Position(BarePosition { kind: None, x, y }) => Ok(ClientMessage::Move { x, y }),
    }
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RegisterResult {
        success: bool,
        message: String,
    },
    LoginResult {
        success: bool,
        message: String,
    },
    MapData {
        seed: u64,
    },
    PlayerId {
        id: u32,
        x: f64,
        y: f64,
    },
    GameState {
        #[serde(with = "players_by_id")]
        players: BTreeMap<u32, PlayerState>,
    },
    AttackEvent(AttackEvent),
}

/// Public view of a connected player, as carried in `game_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: u32,
    pub username: String,
    pub x: f64,
    pub y: f64,
    pub health: u32,
    pub max_health: u32,
    pub color: [u8; 3],
}

/// Outcome of one hit. `killed` and the respawn position are only present
/// when the hit emptied the target's health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackEvent {
    pub attacker_id: u32,
    pub target_id: u32,
    pub damage: u32,
    pub remaining_health: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub killed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respawn_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respawn_y: Option<f64>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

// JSON object keys are strings; integer keys do not survive the buffering
// serde does for internally tagged enums, so convert explicitly.
mod players_by_id {
    use super::PlayerState;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        players: &BTreeMap<u32, PlayerState>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let keyed: BTreeMap<String, &PlayerState> = players
            .iter()
            .map(|(id, player)| (id.to_string(), player))
            .collect();
        keyed.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<u32, PlayerState>, D::Error> {
        let keyed = BTreeMap::<String, PlayerState>::deserialize(deserializer)?;
        keyed
            .into_iter()
            .map(|(key, player)| {
                key.parse::<u32>()
                    .map(|id| (id, player))
                    .map_err(|_| D::Error::custom(format!("invalid player id key {key:?}")))
            })
            .collect()
    }
}
