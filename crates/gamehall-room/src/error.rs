//! Error types for the room layer.

use std::time::Duration;

use gamehall_protocol::{ErrorKind, PlayerId, RoomId, RoomStatus};

/// Errors that can occur during room operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// Capacity bounds are unusable, or more members were seeded than fit.
    #[error("invalid capacity {min}..={max} for {members} member(s)")]
    InvalidCapacity {
        min: usize,
        max: usize,
        members: usize,
    },

    /// A private room was requested without a password.
    #[error("a private room needs a non-empty password")]
    PasswordRequired,

    /// The room has left `waiting` and accepts no new members.
    #[error("room {room} is {status} and closed for joining")]
    ClosedForJoining { room: RoomId, status: RoomStatus },

    /// The room is full.
    #[error("room {0} is full")]
    CapacityFull(RoomId),

    /// The password was missing or did not match.
    #[error("wrong password for room {0}")]
    InvalidPassword(RoomId),

    /// Only the owner may do this.
    #[error("player {player} does not own room {room}")]
    NotOwner { room: RoomId, player: PlayerId },

    /// The player is not a member of this room.
    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomId),

    /// The owner tried to kick themself.
    #[error("the owner cannot kick themself")]
    CannotKickSelf,

    /// Fewer members than the room's minimum.
    #[error("room {room} has {have} player(s), needs {need}")]
    InsufficientPlayers {
        room: RoomId,
        have: usize,
        need: usize,
    },

    /// The room's status does not allow this operation.
    #[error("cannot {operation} room {room} while {status}")]
    InvalidState {
        room: RoomId,
        status: RoomStatus,
        operation: &'static str,
    },

    /// The room's actor is gone without having finished (registry shut down).
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    /// A player sits in one live room at a time.
    #[error("player {player} is already in room {room}")]
    AlreadyInRoom { player: PlayerId, room: RoomId },

    /// Chat messages need some text.
    #[error("message is empty")]
    EmptyMessage,
}

impl RoomError {
    /// The error category this failure belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCapacity { .. }
            | Self::PasswordRequired
            | Self::CannotKickSelf
            | Self::EmptyMessage => ErrorKind::Validation,
            Self::NotFound(_) | Self::NotInRoom(..) => ErrorKind::NotFound,
            Self::CapacityFull(_) => ErrorKind::Capacity,
            Self::ClosedForJoining { .. }
            | Self::InsufficientPlayers { .. }
            | Self::InvalidState { .. }
            | Self::Unavailable(_)
            | Self::AlreadyInRoom { .. } => ErrorKind::State,
            Self::NotOwner { .. } | Self::InvalidPassword(_) => ErrorKind::Authorization,
        }
    }
}

/// A failure talking to an external store.
///
/// Never fatal to a room: the in-memory state stays authoritative and
/// the next committed version supersedes whatever failed to land.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    /// The store rejected or could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer in time.
    #[error("store timed out after {0:?}")]
    Timeout(Duration),
}

impl PersistenceError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Persistence
    }
}
