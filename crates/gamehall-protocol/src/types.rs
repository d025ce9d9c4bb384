//! Core lobby vocabulary: identifiers, catalog records, and the room
//! status state machine.
//!
//! Everything here is shared by the room registry, the matchmaking queue,
//! and the presence layer, and most of it travels to clients inside
//! [`LobbyEvent`](crate::LobbyEvent)s, so every type is serde-derived.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player profile.
///
/// A player is the per-game identity of a user (level, score, display
/// name). Newtype so a `PlayerId` can never be passed where a `RoomId` or
/// `UserId` is expected. `#[serde(transparent)]` keeps the wire form a
/// plain number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a room.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// The account that owns one or more player profiles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// Catalog identifier of a game, e.g. `"g1"` or `"chess"`.
///
/// Unlike the numeric ids this one is chosen by whoever maintains the
/// catalog, so it is a string. Use [`GameId::parse`] for untrusted input;
/// it rejects empty and whitespace-padded ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    /// Wraps a trusted id without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Validates and wraps an id received from a client.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        if raw.is_empty() || raw.trim() != raw {
            return Err(ProtocolError::InvalidValue(format!(
                "game id {raw:?} must be non-empty and unpadded"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ---------------------------------------------------------------------------
// Catalog records
// ---------------------------------------------------------------------------

/// Minimum and maximum number of players.
///
/// Used both for a game's supported player counts and for a room's
/// bounds. A capacity is valid when `min >= 1` and `max >= min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub min: usize,
    pub max: usize,
}

impl Capacity {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// Returns `true` if the bounds are usable for a room.
    pub fn is_valid(&self) -> bool {
        self.min >= 1 && self.max >= self.min
    }
}

/// Genre tag of a catalog game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Genre {
    Fps,
    Moba,
    Rpg,
    Card,
    Puzzle,
}

/// A catalog entry. Owned by the external catalog; the lobby only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub name: String,
    pub genre: Genre,
    /// Supported player counts. Rooms for this game inherit these bounds.
    pub players: Capacity,
}

/// A player profile as the catalog stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub user_id: UserId,
    pub display_name: String,
    pub level: u32,
    pub score: i64,
    /// Whether the player currently has a live connection.
    pub online: bool,
    /// The room the player is in, if any. Lookup only: the room registry
    /// owns membership, this is never used to mutate a room.
    #[serde(default)]
    pub current_room: Option<RoomId>,
}

/// The slice of a [`Player`] that a room keeps in its member list and
/// shows to the other members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMember {
    pub id: PlayerId,
    pub user_id: UserId,
    pub display_name: String,
    pub level: u32,
}

impl From<&Player> for RoomMember {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            user_id: player.user_id,
            display_name: player.display_name.clone(),
            level: player.level,
        }
    }
}

/// Matchmaking mode requested by a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Ranked,
    Casual,
    Team,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ranked => f.write_str("ranked"),
            Self::Casual => f.write_str("casual"),
            Self::Team => f.write_str("team"),
        }
    }
}

impl FromStr for MatchMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ranked" => Ok(Self::Ranked),
            "casual" => Ok(Self::Casual),
            "team" => Ok(Self::Team),
            other => Err(ProtocolError::InvalidValue(format!(
                "unknown match mode {other:?}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// Transitions are strictly ordered and one-directional:
///
/// ```text
/// Waiting → Loading → Playing → Finished
/// ```
///
/// - **Waiting**: accepting joins, the owner may start.
/// - **Loading**: the owner started; clients are loading the session.
/// - **Playing**: the session is running.
/// - **Finished**: terminal. Reached by a normal end, a forced close, or
///   auto-dissolution when the last member leaves.
///
/// `Finished` is reachable from every other state (close and dissolution
/// skip ahead); nothing is reachable from `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Loading,
    Playing,
    Finished,
}

impl RoomStatus {
    /// Returns `true` if the room is accepting new players.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` once the room can never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// The next state in the normal progression, `None` when terminal.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Waiting => Some(Self::Loading),
            Self::Loading => Some(Self::Playing),
            Self::Playing => Some(Self::Finished),
            Self::Finished => None,
        }
    }

    /// Returns `true` if moving to `target` keeps the lifecycle monotonic:
    /// either the next state, or `Finished` from any live state.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target) || (target == Self::Finished && !self.is_terminal())
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Loading => write!(f, "loading"),
            Self::Playing => write!(f, "playing"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Milliseconds since the Unix epoch, the timestamp unit used on the wire.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&PlayerId(42)).unwrap();
        assert_eq!(json, "42");
        assert_eq!(PlayerId(7).to_string(), "P-7");
    }

    #[test]
    fn test_game_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&GameId::from("g1")).unwrap();
        assert_eq!(json, "\"g1\"");
    }

    #[test]
    fn test_game_id_parse_rejects_empty_and_padded() {
        assert!(GameId::parse("").is_err());
        assert!(GameId::parse(" g1").is_err());
        assert_eq!(GameId::parse("g1").unwrap().as_str(), "g1");
    }

    #[test]
    fn test_capacity_validity() {
        assert!(Capacity::new(1, 1).is_valid());
        assert!(Capacity::new(2, 4).is_valid());
        assert!(!Capacity::new(0, 4).is_valid());
        assert!(!Capacity::new(3, 2).is_valid());
    }

    #[test]
    fn test_match_mode_parses_lowercase_tags() {
        assert_eq!("casual".parse::<MatchMode>().unwrap(), MatchMode::Casual);
        assert!("Casual".parse::<MatchMode>().is_err());
        let json = serde_json::to_string(&MatchMode::Ranked).unwrap();
        assert_eq!(json, "\"ranked\"");
    }

    #[test]
    fn test_room_status_next_follows_strict_order() {
        assert_eq!(RoomStatus::Waiting.next(), Some(RoomStatus::Loading));
        assert_eq!(RoomStatus::Loading.next(), Some(RoomStatus::Playing));
        assert_eq!(RoomStatus::Playing.next(), Some(RoomStatus::Finished));
        assert_eq!(RoomStatus::Finished.next(), None);
    }

    #[test]
    fn test_room_status_never_moves_backward() {
        use RoomStatus::*;
        let all = [Waiting, Loading, Playing, Finished];
        for (i, from) in all.iter().enumerate() {
            for to in &all[..=i] {
                assert!(
                    !from.can_transition_to(*to),
                    "{from} -> {to} must be rejected"
                );
            }
        }
    }

    #[test]
    fn test_room_status_finished_reachable_from_every_live_state() {
        assert!(RoomStatus::Waiting.can_transition_to(RoomStatus::Finished));
        assert!(RoomStatus::Loading.can_transition_to(RoomStatus::Finished));
        assert!(RoomStatus::Playing.can_transition_to(RoomStatus::Finished));
        assert!(!RoomStatus::Waiting.can_transition_to(RoomStatus::Playing));
    }

    #[test]
    fn test_room_status_serializes_lowercase() {
        let json = serde_json::to_string(&RoomStatus::Waiting).unwrap();
        assert_eq!(json, "\"waiting\"");
        assert!(RoomStatus::Waiting.is_joinable());
        assert!(!RoomStatus::Loading.is_joinable());
    }

    #[test]
    fn test_room_member_from_player_drops_live_fields() {
        let player = Player {
            id: PlayerId(1),
            user_id: UserId(10),
            display_name: "ada".into(),
            level: 3,
            score: 120,
            online: true,
            current_room: Some(RoomId(5)),
        };
        let member = RoomMember::from(&player);
        assert_eq!(member.id, PlayerId(1));
        assert_eq!(member.display_name, "ada");
        assert_eq!(member.level, 3);
    }
}
