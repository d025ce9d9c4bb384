//! Registry configuration and the inputs that create or close a room.

use std::time::Duration;

use gamehall_protocol::{Capacity, GameId, MatchMode, PlayerId, RoomMember};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for a [`RoomRegistry`](crate::RoomRegistry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Capacity of each room actor's command channel. When full, callers
    /// wait (bounded channel backpressure).
    pub command_buffer: usize,

    /// Capacity of the room event broadcast channel. Subscribers that fall
    /// further behind than this see `RecvError::Lagged`.
    pub event_buffer: usize,

    /// How long the persistence writer waits on a single store write
    /// before giving up on that version.
    pub persist_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            command_buffer: 64,
            event_buffer: 256,
            persist_timeout: Duration::from_secs(2),
        }
    }
}

// ---------------------------------------------------------------------------
// NewRoom
// ---------------------------------------------------------------------------

/// How a room came into being.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RoomOrigin {
    /// A player created it from the lobby.
    Lobby,
    /// Matchmaking created it for a matched group.
    Matchmaking { mode: MatchMode },
}

/// Everything needed to create a room.
///
/// The owner always becomes the first member. `members` seeds additional
/// members in order, which is how matchmaking populates a room in one
/// step instead of a create followed by N joins.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub game_id: GameId,
    pub name: String,
    pub owner: RoomMember,
    pub capacity: Capacity,
    pub is_private: bool,
    pub password: Option<String>,
    pub settings: serde_json::Map<String, serde_json::Value>,
    pub members: Vec<RoomMember>,
    pub origin: RoomOrigin,
}

impl NewRoom {
    /// A public lobby room with no settings and only the owner inside.
    pub fn new(
        game_id: GameId,
        name: impl Into<String>,
        owner: RoomMember,
        capacity: Capacity,
    ) -> Self {
        Self {
            game_id,
            name: name.into(),
            owner,
            capacity,
            is_private: false,
            password: None,
            settings: serde_json::Map::new(),
            members: Vec::new(),
            origin: RoomOrigin::Lobby,
        }
    }

    /// Makes the room private behind `password`.
    pub fn private(mut self, password: impl Into<String>) -> Self {
        self.is_private = true;
        self.password = Some(password.into());
        self
    }
}

// ---------------------------------------------------------------------------
// CloseRequester
// ---------------------------------------------------------------------------

/// Who is asking to close a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseRequester {
    /// A player; only the owner may close.
    Player(PlayerId),
    /// The system (idle reaping, admin action). Always allowed.
    System,
}
