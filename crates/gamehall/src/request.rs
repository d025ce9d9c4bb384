//! Typed requests and responses for each lobby operation.
//!
//! Required inputs are plain fields; optional ones are `Option` and
//! default to `None` when deserialized.

use gamehall_matchmaking::QueueInfo;
use gamehall_protocol::{GameId, MatchMode, PlayerId, RoomId};
use gamehall_room::RoomSnapshot;
use serde::{Deserialize, Serialize};

pub type Settings = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    pub player_id: PlayerId,
    pub game_id: GameId,
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
    /// Required when `is_private`.
    #[serde(default)]
    pub password: Option<String>,
    /// Merged over the lobby's default settings.
    #[serde(default)]
    pub settings: Option<Settings>,
}

impl CreateRoomRequest {
    pub fn new(player_id: PlayerId, game_id: GameId, name: impl Into<String>) -> Self {
        Self {
            player_id,
            game_id,
            name: name.into(),
            is_private: false,
            password: None,
            settings: None,
        }
    }

    pub fn private(mut self, password: impl Into<String>) -> Self {
        self.is_private = true;
        self.password = Some(password.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateRoomResponse {
    pub room: RoomSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomRequest {
    pub player_id: PlayerId,
    pub room_id: RoomId,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinRoomResponse {
    pub room: RoomSnapshot,
    /// The player was already a member; nothing changed.
    pub already_member: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LeaveRoomRequest {
    pub player_id: PlayerId,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaveRoomResponse {
    pub left: bool,
    pub room_destroyed: bool,
    pub new_owner: Option<PlayerId>,
}

/// Requests made by a room's owner: start, close, and so on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OwnerRequest {
    pub player_id: PlayerId,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KickRequest {
    pub player_id: PlayerId,
    pub room_id: RoomId,
    pub target: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettingsRequest {
    pub player_id: PlayerId,
    pub room_id: RoomId,
    pub settings: Settings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SetReadyRequest {
    pub player_id: PlayerId,
    pub room_id: RoomId,
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub player_id: PlayerId,
    pub room_id: RoomId,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SendMessageResponse {
    /// Unix milliseconds when the lobby accepted the message.
    pub sent_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomResponse {
    pub room: RoomSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CloseRoomResponse {
    /// `false` when the room had already finished.
    pub closed: bool,
}

// ---------------------------------------------------------------------------
// Matchmaking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinQueueRequest {
    pub player_id: PlayerId,
    pub game_id: GameId,
    pub mode: MatchMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JoinQueueResponse {
    pub position: usize,
    pub queue_size: usize,
    /// An earlier request for the same game was replaced.
    pub replaced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveQueueRequest {
    pub player_id: PlayerId,
    pub game_id: GameId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaveQueueResponse {
    /// `false` when the player had no request for the game.
    pub left: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueInfoResponse {
    pub game_id: GameId,
    pub queue_size: usize,
    /// Seconds the oldest request has waited.
    pub longest_wait_secs: u64,
}

impl From<QueueInfo> for QueueInfoResponse {
    fn from(info: QueueInfo) -> Self {
        Self {
            game_id: info.game_id,
            queue_size: info.queue_size,
            longest_wait_secs: info.longest_wait.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_room_request_optional_fields_default() {
        let req: CreateRoomRequest =
            serde_json::from_str(r#"{"player_id":1,"game_id":"g1","name":"duel"}"#).unwrap();
        assert!(!req.is_private);
        assert!(req.password.is_none());
        assert!(req.settings.is_none());
    }

    #[test]
    fn test_join_queue_request_requires_mode() {
        let missing = serde_json::from_str::<JoinQueueRequest>(r#"{"player_id":1,"game_id":"g1"}"#);
        assert!(missing.is_err());

        let req: JoinQueueRequest =
            serde_json::from_str(r#"{"player_id":1,"game_id":"g1","mode":"team"}"#).unwrap();
        assert_eq!(req.mode, MatchMode::Team);
    }

    #[test]
    fn test_queue_info_response_rounds_down_to_seconds() {
        let info = QueueInfo {
            game_id: GameId::from("g1"),
            queue_size: 2,
            longest_wait: std::time::Duration::from_millis(2_900),
        };
        let resp = QueueInfoResponse::from(info);
        assert_eq!(resp.longest_wait_secs, 2);
    }
}
