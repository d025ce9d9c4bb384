//! Unified error type for the lobby.

use gamehall_matchmaking::MatchError;
use gamehall_presence::PresenceError;
use gamehall_protocol::{ErrorKind, GameId, PlayerId, ProtocolError};
use gamehall_room::{PersistenceError, RoomError};

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` variants let `?` convert sub-crate errors. Callers that
/// build a response only need [`LobbyError::kind`] and the message.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Presence(#[from] PresenceError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("game {0} not found")]
    GameNotFound(GameId),

    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    /// A request was malformed before any layer looked at it.
    #[error("invalid request: {0}")]
    Validation(String),
}

impl LobbyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::Room(e) => e.kind(),
            Self::Match(e) => e.kind(),
            Self::Presence(e) => e.kind(),
            Self::Persistence(e) => e.kind(),
            Self::GameNotFound(_) | Self::PlayerNotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Numeric status for the failure category.
    pub fn code(&self) -> u16 {
        self.kind().code()
    }
}
