//! Error types for the protocol layer.
//!
//! Each crate in Gamehall defines its own error enum. A `ProtocolError`
//! always means the problem is in encoding, decoding, or validating a
//! value that crosses a process boundary, never in room or queue logic.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// wrong data types, or truncated messages.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// An identifier or tag failed validation, e.g. an empty game id or
    /// an unknown matchmaking mode.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// The category of a failure, independent of which layer produced it.
///
/// Every error enum in Gamehall maps onto one of these via a `kind()`
/// method, so callers can turn any failure into a structured response
/// without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input: bad capacity bounds, missing password, bad ids.
    Validation,
    /// A room, player, or game does not exist.
    NotFound,
    /// The room is full.
    Capacity,
    /// The operation is not valid for the room's current status.
    State,
    /// The requester may not perform this action (non-owner, wrong password).
    Authorization,
    /// An external store was unavailable.
    Persistence,
}

impl ErrorKind {
    /// HTTP-style status code for responses to clients.
    pub fn code(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Authorization => 403,
            Self::NotFound => 404,
            Self::Capacity | Self::State => 409,
            Self::Persistence => 503,
        }
    }
}
