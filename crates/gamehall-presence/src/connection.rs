//! Connection state for one player.

use std::time::Duration;

use tokio::time::Instant;

/// Presence configuration.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// How long a dropped player may take to come back before they are
    /// forfeited out of their room.
    ///
    /// Default: 30 seconds. Zero expires on the next sweep.
    pub reconnect_grace: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(30),
        }
    }
}

/// Where a tracked player is in the connection lifecycle.
///
/// ```text
///   Connected ──(disconnect)──→ Disconnected ──(grace elapsed)──→ Expired
///       ↑                            │
///       └─────────(connect)──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// Dropped at `since`; comes back as a reconnect until the grace
    /// period runs out.
    Disconnected { since: Instant },
    /// Grace period elapsed. The next connect counts as a fresh one.
    Expired,
}

impl ConnectionState {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// What a connect did to the player's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionChange {
    /// First connect, or first since the player expired.
    Online,
    /// Came back within the grace period.
    Reconnected,
    /// Already connected; nothing to announce.
    Unchanged,
}

impl ConnectionChange {
    /// Whether the lobby should announce the player as online.
    pub fn is_announced(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}
