//! Shared vocabulary for Gamehall.
//!
//! This crate defines what every other layer talks about:
//!
//! - **Types** ([`PlayerId`], [`RoomId`], [`GameId`], [`Game`], [`Player`],
//!   [`RoomStatus`], ...) — identities, catalog records, and the room
//!   lifecycle state machine.
//! - **Events** ([`LobbyEvent`], [`Topic`], [`Envelope`]) — what clients
//!   are told and which channel it is addressed to.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how events become bytes
//!   for the transport.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Room registry / Matchmaking → Presence (LobbyEvent + Topic) → Codec → Transport
//! ```

mod codec;
mod error;
mod event;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::{ErrorKind, ProtocolError};
pub use event::{Envelope, LobbyEvent, RoomSummary, Topic};
pub use types::{
    Capacity, Game, GameId, Genre, MatchMode, Player, PlayerId, RoomId, RoomMember,
    RoomStatus, UserId, unix_millis,
};
