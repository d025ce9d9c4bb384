//! Room registry for Gamehall.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns the
//! room's member list, status and settings, so every mutation of one room
//! is applied in order while different rooms proceed in parallel.
//!
//! # Key types
//!
//! - [`RoomRegistry`] — creates rooms and routes operations to them
//! - [`RoomHandle`] — sends commands to a running room actor
//! - [`RoomSnapshot`] — a committed, read-only copy of a room
//! - [`RoomEvent`] — what changed, broadcast after each commit
//! - [`RoomStore`] — versioned write-behind persistence
//! - [`RegistryConfig`] — channel sizes and store timeout

mod config;
mod error;
mod event;
mod registry;
mod room;
mod state;
mod store;

pub use config::{CloseRequester, NewRoom, RegistryConfig, RoomOrigin};
pub use error::{PersistenceError, RoomError};
pub use event::{DestroyReason, RoomEvent};
pub use registry::{RoomRegistry, RoomStats};
pub use room::RoomHandle;
pub use state::{CloseOutcome, JoinOutcome, LeaveOutcome, RoomSnapshot};
pub use store::{RoomStore, StoreWrite};
