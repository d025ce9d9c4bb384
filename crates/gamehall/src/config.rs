//! Lobby configuration.

use std::str::FromStr;
use std::time::Duration;

use gamehall_matchmaking::MatchConfig;
use gamehall_presence::PresenceConfig;
use gamehall_room::RegistryConfig;

/// Everything a [`Lobby`](crate::Lobby) needs to know up front.
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    pub registry: RegistryConfig,
    pub matching: MatchConfig,
    pub presence: PresenceConfig,

    /// Pause before the single retry of a failed catalog read.
    pub catalog_retry_backoff: Duration,

    /// How long cached room stats are served before recomputing.
    pub stats_ttl: Duration,

    /// How often dropped connections are checked for expiry.
    pub sweep_interval: Duration,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            matching: MatchConfig::default(),
            presence: PresenceConfig::default(),
            catalog_retry_backoff: Duration::from_millis(100),
            stats_ttl: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl LobbyConfig {
    /// Defaults overridden by `GAMEHALL_*` environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `GAMEHALL_GROUP_SIZE` | `matching.group_size` |
    /// | `GAMEHALL_MAX_WAIT_MS` | `matching.max_wait` |
    /// | `GAMEHALL_TICK_MS` | `matching.tick_interval` |
    /// | `GAMEHALL_RECONNECT_GRACE_SECS` | `presence.reconnect_grace` |
    /// | `GAMEHALL_STATS_TTL_SECS` | `stats_ttl` |
    ///
    /// Unparsable or zero values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(size) = parse::<usize>(&lookup, "GAMEHALL_GROUP_SIZE") {
            config.matching.group_size = size;
        }
        if let Some(ms) = parse::<u64>(&lookup, "GAMEHALL_MAX_WAIT_MS") {
            config.matching.max_wait = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&lookup, "GAMEHALL_TICK_MS") {
            config.matching.tick_interval = Duration::from_millis(ms);
        }
        // Zero is a valid grace period, so it skips the positivity check.
        if let Some(raw) = lookup("GAMEHALL_RECONNECT_GRACE_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) => config.presence.reconnect_grace = Duration::from_secs(secs),
                Err(_) => tracing::warn!(
                    value = %raw,
                    "invalid GAMEHALL_RECONNECT_GRACE_SECS, using default"
                ),
            }
        }
        if let Some(secs) = parse::<u64>(&lookup, "GAMEHALL_STATS_TTL_SECS") {
            config.stats_ttl = Duration::from_secs(secs);
        }

        config
    }
}

/// Reads a positive number, warning about anything else.
fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    let raw = lookup(key)?;
    match raw.parse::<T>() {
        Ok(value) if value > T::default() => Some(value),
        _ => {
            tracing::warn!(key, value = %raw, "expected a positive number, using default");
            None
        }
    }
}
