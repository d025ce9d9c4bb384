//! Events pushed to clients and the channels they are addressed to.
//!
//! A [`LobbyEvent`] is the payload; a [`Topic`] names a logical channel
//! (everyone in a room, everyone browsing a game, one player, or the
//! whole lobby). The presence layer decides which topics get which
//! events; the transport only has to deliver bytes to topic members.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Capacity, GameId, MatchMode, PlayerId, RoomId, RoomMember, RoomStatus};

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// A logical broadcast channel.
///
/// Display renders the channel name the transport uses for group
/// membership, e.g. `room:7`, `game:chess`, `player:42`, `lobby`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Topic {
    /// Every member of one room.
    Room(RoomId),
    /// Every client browsing one game's room list.
    Game(GameId),
    /// A single player's private channel.
    Player(PlayerId),
    /// Every connected client.
    Lobby,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Room(id) => write!(f, "room:{}", id.0),
            Self::Game(id) => write!(f, "game:{id}"),
            Self::Player(id) => write!(f, "player:{}", id.0),
            Self::Lobby => f.write_str("lobby"),
        }
    }
}

// ---------------------------------------------------------------------------
// LobbyEvent
// ---------------------------------------------------------------------------

/// What the lobby listing shows about a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub game_id: GameId,
    pub name: String,
    pub status: RoomStatus,
    pub owner: PlayerId,
    pub player_count: usize,
    pub capacity: Capacity,
    pub is_private: bool,
}

/// Events pushed from the lobby to clients.
///
/// Internally tagged: `{ "type": "PlayerJoined", "room_id": 3, ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LobbyEvent {
    /// A room appeared in a game's listing.
    RoomCreated { room: RoomSummary },

    /// A player was appended to a room's member list.
    PlayerJoined {
        room_id: RoomId,
        player: RoomMember,
        player_count: usize,
    },

    /// A player left (or was removed from) a room. `new_owner` is set
    /// when the departing player owned the room and ownership moved.
    PlayerLeft {
        room_id: RoomId,
        player_id: PlayerId,
        new_owner: Option<PlayerId>,
        player_count: usize,
    },

    /// Sent privately to the member who just became owner.
    OwnershipTransferred { room_id: RoomId, new_owner: PlayerId },

    /// The owner removed a member.
    PlayerKicked { room_id: RoomId, player_id: PlayerId },

    /// The room reached `finished` and left the listing.
    RoomDestroyed { room_id: RoomId, game_id: GameId },

    /// The owner started the session (`waiting → loading`).
    GameStarted {
        room_id: RoomId,
        player_count: usize,
        started_at: u64,
    },

    /// The owner changed the room's settings. Carries the merged map.
    SettingsUpdated {
        room_id: RoomId,
        settings: serde_json::Map<String, serde_json::Value>,
    },

    /// A member changed their ready flag. `room_ready` is set once every
    /// member is ready and the room has its minimum.
    RoomReady {
        room_id: RoomId,
        player_id: PlayerId,
        ready: bool,
        room_ready: bool,
    },

    /// A chat line from a room member.
    RoomMessage {
        room_id: RoomId,
        player_id: PlayerId,
        player_name: String,
        message: String,
        timestamp: u64,
    },

    /// A player connected or dropped.
    ConnectionChanged {
        player_id: PlayerId,
        online: bool,
        timestamp: u64,
    },

    /// Acknowledges a matchmaking enqueue to the queued player.
    QueueJoined {
        game_id: GameId,
        mode: MatchMode,
        queue_size: usize,
    },

    /// Acknowledges a matchmaking cancel.
    QueueLeft { game_id: GameId },

    /// Matchmaking placed the player into a freshly created room.
    Matched {
        room_id: RoomId,
        game_id: GameId,
        mode: MatchMode,
        opponents: Vec<RoomMember>,
    },
}

impl LobbyEvent {
    /// Short event name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomCreated { .. } => "room_created",
            Self::PlayerJoined { .. } => "player_joined",
            Self::PlayerLeft { .. } => "player_left",
            Self::OwnershipTransferred { .. } => "ownership_transferred",
            Self::PlayerKicked { .. } => "player_kicked",
            Self::RoomDestroyed { .. } => "room_destroyed",
            Self::GameStarted { .. } => "game_started",
            Self::SettingsUpdated { .. } => "settings_updated",
            Self::RoomReady { .. } => "room_ready",
            Self::RoomMessage { .. } => "room_message",
            Self::ConnectionChanged { .. } => "connection_changed",
            Self::QueueJoined { .. } => "queue_joined",
            Self::QueueLeft { .. } => "queue_left",
            Self::Matched { .. } => "matched",
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The unit handed to the transport: one event plus delivery metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-dispatcher sequence number, for client-side gap detection.
    pub seq: u64,
    /// Unix milliseconds when the envelope was built.
    pub timestamp: u64,
    pub event: LobbyEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UserId;

    #[test]
    fn test_topic_display_matches_channel_names() {
        assert_eq!(Topic::Room(RoomId(7)).to_string(), "room:7");
        assert_eq!(Topic::Game(GameId::from("chess")).to_string(), "game:chess");
        assert_eq!(Topic::Player(PlayerId(42)).to_string(), "player:42");
        assert_eq!(Topic::Lobby.to_string(), "lobby");
    }

    #[test]
    fn test_lobby_event_is_internally_tagged() {
        let event = LobbyEvent::PlayerJoined {
            room_id: RoomId(3),
            player: RoomMember {
                id: PlayerId(9),
                user_id: UserId(90),
                display_name: "bo".into(),
                level: 2,
            },
            player_count: 2,
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "PlayerJoined");
        assert_eq!(json["room_id"], 3);
        assert_eq!(json["player"]["display_name"], "bo");
        assert_eq!(json["player_count"], 2);
    }

    #[test]
    fn test_player_left_without_new_owner_serializes_null() {
        let event = LobbyEvent::PlayerLeft {
            room_id: RoomId(1),
            player_id: PlayerId(2),
            new_owner: None,
            player_count: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json["new_owner"].is_null());
        assert_eq!(event.name(), "player_left");
    }

    #[test]
    fn test_room_created_carries_lowercase_status() {
        let event = LobbyEvent::RoomCreated {
            room: RoomSummary {
                room_id: RoomId(1),
                game_id: GameId::from("g1"),
                name: "friday".into(),
                status: RoomStatus::Waiting,
                owner: PlayerId(1),
                player_count: 1,
                capacity: Capacity::new(2, 4),
                is_private: false,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["room"]["status"], "waiting");
        assert_eq!(json["room"]["capacity"]["max"], 4);
    }

    #[test]
    fn test_room_message_fields() {
        let event = LobbyEvent::RoomMessage {
            room_id: RoomId(4),
            player_id: PlayerId(2),
            player_name: "bo".into(),
            message: "gg".into(),
            timestamp: 1_700,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "RoomMessage");
        assert_eq!(json["player_name"], "bo");
        assert_eq!(json["message"], "gg");
        assert_eq!(event.name(), "room_message");
    }

    #[test]
    fn test_decode_unknown_event_type_returns_error() {
        let unknown = r#"{"type": "FlyToMoon", "speed": 9000}"#;
        let result: Result<LobbyEvent, _> = serde_json::from_str(unknown);
        assert!(result.is_err());
    }
}
