//! Per-player connection tracking with a reconnection grace period.
//!
//! [`ConnectionTracker`] is a plain map with no locking of its own; the
//! lobby keeps it behind a mutex. Expiring and removing are separate
//! steps so the caller can forfeit expired players out of their rooms
//! before the records go away.

use std::collections::HashMap;

use gamehall_protocol::PlayerId;
use tokio::time::Instant;

use crate::{ConnectionChange, ConnectionState, PresenceConfig, PresenceError};

/// Knows every player who is connected or recently dropped.
///
/// ```text
/// connect() ──→ [Connected] ──disconnect()──→ [Disconnected]
///                    ↑                              │
///                    └──────── connect() ───────────┤
///                                                   ▼ expire_stale()
///                                              [Expired] ──→ cleanup_expired()
/// ```
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    players: HashMap<PlayerId, ConnectionState>,
    config: PresenceConfig,
}

impl ConnectionTracker {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            players: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    /// Marks the player connected.
    ///
    /// A player dropped for less than the grace period is
    /// [`Reconnected`](ConnectionChange::Reconnected); one who expired,
    /// or was never seen, comes [`Online`](ConnectionChange::Online).
    pub fn connect(&mut self, player_id: PlayerId) -> ConnectionChange {
        let grace = self.config.reconnect_grace;
        let change = match self.players.get(&player_id) {
            Some(ConnectionState::Connected) => return ConnectionChange::Unchanged,
            Some(ConnectionState::Disconnected { since }) if since.elapsed() < grace => {
                ConnectionChange::Reconnected
            }
            _ => ConnectionChange::Online,
        };
        self.players.insert(player_id, ConnectionState::Connected);
        tracing::info!(%player_id, ?change, "player connected");
        change
    }

    /// Starts the player's grace period. Returns `false` if they were
    /// already offline, in which case the original drop time is kept.
    ///
    /// # Errors
    /// [`PresenceError::NotFound`] if the player never connected.
    pub fn disconnect(&mut self, player_id: PlayerId) -> Result<bool, PresenceError> {
        let state = self
            .players
            .get_mut(&player_id)
            .ok_or(PresenceError::NotFound(player_id))?;
        if !state.is_online() {
            return Ok(false);
        }
        *state = ConnectionState::Disconnected {
            since: Instant::now(),
        };
        tracing::info!(%player_id, "player disconnected, grace period started");
        Ok(true)
    }

    pub fn is_online(&self, player_id: PlayerId) -> bool {
        self.players
            .get(&player_id)
            .is_some_and(ConnectionState::is_online)
    }

    pub fn state(&self, player_id: PlayerId) -> Option<ConnectionState> {
        self.players.get(&player_id).copied()
    }

    /// Expires every player whose grace period has run out and returns
    /// them, sorted.
    pub fn expire_stale(&mut self) -> Vec<PlayerId> {
        let grace = self.config.reconnect_grace;
        let mut expired = Vec::new();
        for (player_id, state) in &mut self.players {
            let ConnectionState::Disconnected { since } = *state else {
                continue;
            };
            if since.elapsed() >= grace {
                *state = ConnectionState::Expired;
                expired.push(*player_id);
                tracing::info!(%player_id, "connection expired (grace period elapsed)");
            }
        }
        expired.sort();
        expired
    }

    /// Forgets expired players. Returns how many were removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let before = self.players.len();
        self.players
            .retain(|_, state| !matches!(state, ConnectionState::Expired));
        before - self.players.len()
    }

    pub fn online_count(&self) -> usize {
        self.players.values().filter(|s| s.is_online()).count()
    }

    /// Tracked players in any state.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
