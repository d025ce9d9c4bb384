//! Matchmaking for Gamehall.
//!
//! - [`MatchmakingQueue`] — per-game FIFO lines of [`MatchRequest`]s, plain data
//! - [`Matchmaker`] — shares a queue between tasks and runs one periodic
//!   match ticker per game with players waiting
//! - [`MatchSink`] — where matched groups go (the lobby creates their room)
//! - [`MatchConfig`] — group size, wait limits, tick period, policies
//!
//! The queue never touches rooms. Turning a [`MatchGroup`] into a room is
//! the sink's job.

mod config;
mod error;
mod matchmaker;
mod queue;
mod ticker;

pub use config::{GroupPolicy, MatchConfig, RequeuePolicy};
pub use error::MatchError;
pub use matchmaker::{Enqueued, MatchGroup, MatchSink, Matchmaker, QueueEvent};
pub use queue::{MatchRequest, MatchmakingQueue, QueueInfo};
