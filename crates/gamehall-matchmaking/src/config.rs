//! Matchmaking configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::MatchError;

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// What happens to a player's wait time when they enqueue again for a
/// game they are already queued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequeuePolicy {
    /// Keep the original timestamp and place in line; only the request's
    /// details (mode, profile) are refreshed.
    #[default]
    PreserveWait,
    /// Treat it as a fresh request at the back of the line.
    ResetWait,
}

/// Whether a group smaller than the target size may be formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPolicy {
    /// Only full groups.
    #[default]
    Strict,
    /// Once the oldest request has waited `max_wait`, take whoever is
    /// queued, even a single player.
    Lenient,
}

// ---------------------------------------------------------------------------
// MatchConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Matchmaker`](crate::Matchmaker).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Players per match.
    pub group_size: usize,

    /// How long the oldest request waits before a lenient match may form
    /// a short group.
    pub max_wait: Duration,

    /// Period of each game's match ticker.
    pub tick_interval: Duration,

    /// Upper bound of the random delay added to a ticker's first tick, so
    /// games that become active together don't tick in lockstep.
    pub initial_jitter: Duration,

    pub requeue: RequeuePolicy,
    pub group: GroupPolicy,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            group_size: 2,
            max_wait: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
            initial_jitter: Duration::from_millis(250),
            requeue: RequeuePolicy::default(),
            group: GroupPolicy::default(),
        }
    }
}

impl MatchConfig {
    /// Rejects settings no ticker could run with.
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.group_size == 0 {
            return Err(MatchError::InvalidConfig("group_size must be at least 1".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(MatchError::InvalidConfig("tick_interval must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_config_default() {
        let config = MatchConfig::default();
        assert_eq!(config.group_size, 2);
        assert_eq!(config.max_wait, Duration::from_secs(30));
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.initial_jitter, Duration::from_millis(250));
        assert_eq!(config.requeue, RequeuePolicy::PreserveWait);
        assert_eq!(config.group, GroupPolicy::Strict);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_match_config_rejects_zero_group_and_interval() {
        let config = MatchConfig {
            group_size: 0,
            ..MatchConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MatchConfig {
            tick_interval: Duration::ZERO,
            ..MatchConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
