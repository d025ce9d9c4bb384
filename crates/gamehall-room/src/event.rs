//! Domain events published by room actors.

use gamehall_protocol::{GameId, PlayerId, RoomId, RoomMember};

use crate::RoomSnapshot;

/// Why a room reached `finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    /// The last member left.
    Dissolved,
    /// The owner or the system closed it.
    Closed,
}

/// A committed change to one room.
///
/// Published on the registry's broadcast channel after the room actor
/// has applied the change and published the new snapshot, so a
/// subscriber that reads [`RoomRegistry::room_info`](crate::RoomRegistry::room_info)
/// on receipt sees at least this version. Events for one room arrive in
/// commit order.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Created {
        room: RoomSnapshot,
    },
    PlayerJoined {
        room_id: RoomId,
        game_id: GameId,
        member: RoomMember,
        player_count: usize,
    },
    PlayerLeft {
        room_id: RoomId,
        game_id: GameId,
        player_id: PlayerId,
        /// Set when the leaver owned the room and ownership moved.
        new_owner: Option<PlayerId>,
        player_count: usize,
    },
    PlayerKicked {
        room_id: RoomId,
        game_id: GameId,
        player_id: PlayerId,
        player_count: usize,
    },
    GameStarted {
        room_id: RoomId,
        game_id: GameId,
        player_count: usize,
        started_at: u64,
    },
    SettingsUpdated {
        room_id: RoomId,
        settings: serde_json::Map<String, serde_json::Value>,
    },
    ReadyChanged {
        room_id: RoomId,
        player_id: PlayerId,
        ready: bool,
        /// Every member is ready and the minimum is met.
        room_ready: bool,
    },
    /// A chat line. Not a state change: the room's version is untouched.
    Message {
        room_id: RoomId,
        player_id: PlayerId,
        display_name: String,
        message: String,
        sent_at: u64,
    },
    Destroyed {
        room_id: RoomId,
        game_id: GameId,
        reason: DestroyReason,
        /// Members still listed when the room finished. Empty on dissolve.
        members: Vec<PlayerId>,
    },
}

impl RoomEvent {
    /// The room this event belongs to.
    pub fn room_id(&self) -> RoomId {
        match self {
            Self::Created { room } => room.id,
            Self::PlayerJoined { room_id, .. }
            | Self::PlayerLeft { room_id, .. }
            | Self::PlayerKicked { room_id, .. }
            | Self::GameStarted { room_id, .. }
            | Self::SettingsUpdated { room_id, .. }
            | Self::ReadyChanged { room_id, .. }
            | Self::Message { room_id, .. }
            | Self::Destroyed { room_id, .. } => *room_id,
        }
    }
}
