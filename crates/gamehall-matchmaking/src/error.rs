//! Error types for the matchmaking layer.

use gamehall_protocol::ErrorKind;

/// Errors that can occur while matchmaking.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// The configuration can't drive a ticker.
    #[error("invalid matchmaking config: {0}")]
    InvalidConfig(String),

    /// The sink could not turn a matched group into a room. The group is
    /// put back in the queue.
    #[error("match delivery failed: {reason}")]
    Delivery { kind: ErrorKind, reason: String },
}

impl MatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::Validation,
            Self::Delivery { kind, .. } => *kind,
        }
    }
}
