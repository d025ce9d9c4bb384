//! Error types for the presence layer.

use gamehall_protocol::{ErrorKind, PlayerId, ProtocolError};

/// Errors that can occur while tracking connections or delivering events.
///
/// Delivery errors are logged by the [`Dispatcher`](crate::Dispatcher)
/// and never reach the operation that caused the event.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// The player has no connection record.
    #[error("no connection record for player {0}")]
    NotFound(PlayerId),

    /// An envelope could not be encoded.
    #[error(transparent)]
    Encode(#[from] ProtocolError),

    /// The transport refused or dropped a delivery.
    #[error("transport error: {0}")]
    Transport(String),
}

impl PresenceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Encode(_) => ErrorKind::Validation,
            Self::Transport(_) => ErrorKind::Persistence,
        }
    }
}
