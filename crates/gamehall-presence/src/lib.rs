//! Presence for Gamehall: who hears about what.
//!
//! 1. **Mapping**: [`PresenceBroadcaster`] turns room and queue events
//!    into addressed [`Directive`]s (emit to topics, subscribe,
//!    unsubscribe). Pure, no I/O.
//! 2. **Delivery**: [`Dispatcher`] applies directives through a
//!    [`Transport`], encoding each event once.
//! 3. **Connections**: [`ConnectionTracker`] knows who is online and
//!    who dropped recently enough to come back.
//!
//! ```text
//! RoomEvent / QueueEvent ──→ PresenceBroadcaster ──→ Directive ──→ Dispatcher ──→ Transport
//! ```

mod broadcaster;
mod connection;
mod error;
mod tracker;
mod transport;

pub use broadcaster::{Directive, PresenceBroadcaster};
pub use connection::{ConnectionChange, ConnectionState, PresenceConfig};
pub use error::PresenceError;
pub use tracker::ConnectionTracker;
pub use transport::{DispatchStats, Dispatcher, MemoryTransport, Transport};
