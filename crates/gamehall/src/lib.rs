//! # Gamehall
//!
//! A multiplayer game lobby. Players browse games, create or join rooms
//! with bounded capacity, or queue for matchmaking, and everyone affected
//! is told about each change.
//!
//! This crate wires the layers together behind [`Lobby`]:
//!
//! - [`gamehall_room`]: rooms, one actor task each
//! - [`gamehall_matchmaking`]: per-game queues and match tickers
//! - [`gamehall_presence`]: who hears about what, and connection tracking
//!
//! ```rust,no_run
//! use gamehall::{CreateRoomRequest, Lobby, LobbyConfig, MemoryStore};
//! use gamehall::presence::MemoryTransport;
//! use gamehall::protocol::{GameId, PlayerId};
//!
//! # async fn run() -> Result<(), gamehall::LobbyError> {
//! let store = MemoryStore::new();
//! let lobby = Lobby::new(LobbyConfig::from_env(), store, MemoryTransport::new())?;
//! let created = lobby
//!     .create_room(CreateRoomRequest::new(PlayerId(1), GameId::from("chess"), "Friday blitz"))
//!     .await?;
//! println!("room {} is waiting", created.room.id);
//! # Ok(())
//! # }
//! ```

mod catalog;
mod config;
mod error;
mod lobby;
mod matched;
mod pump;
mod request;
pub mod telemetry;

pub use catalog::{Catalog, MemoryCache, MemoryStore, NoCache, StatsCache};
pub use config::LobbyConfig;
pub use error::LobbyError;
pub use lobby::Lobby;
pub use matched::RoomMaker;
pub use request::{
    CloseRoomResponse, CreateRoomRequest, CreateRoomResponse, JoinQueueRequest,
    JoinQueueResponse, JoinRoomRequest, JoinRoomResponse, KickRequest, LeaveQueueRequest,
    LeaveQueueResponse, LeaveRoomRequest, LeaveRoomResponse, OwnerRequest, QueueInfoResponse,
    RoomResponse, SendMessageRequest, SendMessageResponse, SetReadyRequest, Settings,
    UpdateSettingsRequest,
};

pub use gamehall_matchmaking as matchmaking;
pub use gamehall_presence as presence;
pub use gamehall_protocol as protocol;
pub use gamehall_room as room;
