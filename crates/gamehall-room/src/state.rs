//! The room entity and every rule that guards it.
//!
//! [`Room`] is plain data with synchronous methods. It knows nothing
//! about tasks or channels: the actor in `room.rs` owns one and calls
//! these methods one command at a time, which is what makes each
//! operation atomic. Every successful mutation bumps `version` and
//! queues the matching [`RoomEvent`]s for the actor to publish.

use gamehall_protocol::{
    Capacity, GameId, PlayerId, RoomId, RoomMember, RoomStatus, RoomSummary, unix_millis,
};
use serde::{Deserialize, Serialize};

use crate::{CloseRequester, DestroyReason, NewRoom, RoomError, RoomEvent, RoomOrigin};

// ---------------------------------------------------------------------------
// Snapshot and outcomes
// ---------------------------------------------------------------------------

/// A point-in-time copy of a room, as readers and the store see it.
///
/// The password is deliberately absent; it never leaves the room actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub game_id: GameId,
    pub name: String,
    pub status: RoomStatus,
    pub owner: PlayerId,
    /// In join order. The first entry inherits ownership.
    pub members: Vec<RoomMember>,
    pub capacity: Capacity,
    pub is_private: bool,
    pub settings: serde_json::Map<String, serde_json::Value>,
    pub origin: RoomOrigin,
    pub created_at: u64,
    pub started_at: Option<u64>,
    /// Members who have readied up, in the order they did.
    #[serde(default)]
    pub ready: Vec<PlayerId>,
    /// Bumped on every committed change. Stores keep the highest one.
    pub version: u64,
}

impl RoomSnapshot {
    pub fn player_count(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.members.iter().any(|m| m.id == player_id)
    }

    pub fn member_ids(&self) -> Vec<PlayerId> {
        self.members.iter().map(|m| m.id).collect()
    }

    /// Still waiting, at least `capacity.min` members, and all of them ready.
    pub fn is_ready(&self) -> bool {
        all_ready(self.status, &self.members, &self.ready, self.capacity)
    }

    /// The lobby-listing view of this room.
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.id,
            game_id: self.game_id.clone(),
            name: self.name.clone(),
            status: self.status,
            owner: self.owner,
            player_count: self.members.len(),
            capacity: self.capacity,
            is_private: self.is_private,
        }
    }
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// The player was appended to the member list.
    Joined(RoomSnapshot),
    /// The player was already a member; nothing changed.
    AlreadyMember(RoomSnapshot),
}

impl JoinOutcome {
    pub fn room(&self) -> &RoomSnapshot {
        match self {
            Self::Joined(room) | Self::AlreadyMember(room) => room,
        }
    }

    pub fn into_room(self) -> RoomSnapshot {
        match self {
            Self::Joined(room) | Self::AlreadyMember(room) => room,
        }
    }

    /// `true` if this join changed the room.
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Joined(_))
    }
}

/// Result of a leave. Leaving never fails; an absent room or member
/// simply reports `left == false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeaveOutcome {
    pub left: bool,
    /// The leaver was the last member and the room is now `finished`.
    pub room_destroyed: bool,
    /// Set when the leaver owned the room and ownership moved.
    pub new_owner: Option<PlayerId>,
}

impl LeaveOutcome {
    /// Nothing to leave.
    pub const ABSENT: Self = Self {
        left: false,
        room_destroyed: false,
        new_owner: None,
    };
}

/// Result of a close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    AlreadyClosed,
}

fn all_ready(
    status: RoomStatus,
    members: &[RoomMember],
    ready: &[PlayerId],
    capacity: Capacity,
) -> bool {
    status == RoomStatus::Waiting
        && members.len() >= capacity.min
        && members.iter().all(|m| ready.contains(&m.id))
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

pub(crate) struct Room {
    id: RoomId,
    game_id: GameId,
    name: String,
    status: RoomStatus,
    owner: PlayerId,
    members: Vec<RoomMember>,
    capacity: Capacity,
    is_private: bool,
    password: Option<String>,
    settings: serde_json::Map<String, serde_json::Value>,
    origin: RoomOrigin,
    created_at: u64,
    started_at: Option<u64>,
    ready: Vec<PlayerId>,
    version: u64,
    pending: Vec<RoomEvent>,
}

impl Room {
    /// Checks a creation request without allocating anything.
    pub(crate) fn validate(new: &NewRoom) -> Result<(), RoomError> {
        let seeded = 1 + new.members.iter().filter(|m| m.id != new.owner.id).count();
        if !new.capacity.is_valid() || seeded > new.capacity.max {
            return Err(RoomError::InvalidCapacity {
                min: new.capacity.min,
                max: new.capacity.max,
                members: seeded,
            });
        }
        if new.is_private && new.password.as_deref().is_none_or(str::is_empty) {
            return Err(RoomError::PasswordRequired);
        }
        Ok(())
    }

    /// Builds a `waiting` room with the owner first, then the seeded
    /// members in order (duplicates dropped).
    pub(crate) fn create(id: RoomId, new: NewRoom) -> Result<Self, RoomError> {
        Self::validate(&new)?;

        let owner = new.owner.id;
        let mut members = Vec::with_capacity(1 + new.members.len());
        members.push(new.owner);
        for member in new.members {
            if !members.iter().any(|m: &RoomMember| m.id == member.id) {
                members.push(member);
            }
        }

        Ok(Self {
            id,
            game_id: new.game_id,
            name: new.name,
            status: RoomStatus::Waiting,
            owner,
            members,
            capacity: new.capacity,
            is_private: new.is_private,
            password: if new.is_private { new.password } else { None },
            settings: new.settings,
            origin: new.origin,
            created_at: unix_millis(),
            started_at: None,
            ready: Vec::new(),
            version: 1,
            pending: Vec::new(),
        })
    }

    pub(crate) fn id(&self) -> RoomId {
        self.id
    }

    pub(crate) fn status(&self) -> RoomStatus {
        self.status
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id,
            game_id: self.game_id.clone(),
            name: self.name.clone(),
            status: self.status,
            owner: self.owner,
            members: self.members.clone(),
            capacity: self.capacity,
            is_private: self.is_private,
            settings: self.settings.clone(),
            origin: self.origin,
            created_at: self.created_at,
            started_at: self.started_at,
            ready: self.ready.clone(),
            version: self.version,
        }
    }

    /// Drains the events queued by mutations since the last call.
    pub(crate) fn take_events(&mut self) -> Vec<RoomEvent> {
        std::mem::take(&mut self.pending)
    }

    // -- operations ---------------------------------------------------------

    /// Appends `member`. Returns `Ok(false)` for an existing member.
    ///
    /// Checks run in a fixed order: membership, status, capacity,
    /// password. The supplied password is compared and dropped.
    pub(crate) fn join(
        &mut self,
        member: RoomMember,
        password: Option<&str>,
    ) -> Result<bool, RoomError> {
        if self.position(member.id).is_some() {
            return Ok(false);
        }
        if !self.status.is_joinable() {
            return Err(RoomError::ClosedForJoining {
                room: self.id,
                status: self.status,
            });
        }
        if self.members.len() >= self.capacity.max {
            return Err(RoomError::CapacityFull(self.id));
        }
        if self.is_private && (self.password.is_none() || self.password.as_deref() != password) {
            return Err(RoomError::InvalidPassword(self.id));
        }

        self.members.push(member.clone());
        self.bump();
        self.pending.push(RoomEvent::PlayerJoined {
            room_id: self.id,
            game_id: self.game_id.clone(),
            member,
            player_count: self.members.len(),
        });
        Ok(true)
    }

    /// Removes `player_id`, dissolving the room when it empties and
    /// handing ownership to the earliest remaining member when the owner
    /// leaves.
    pub(crate) fn leave(&mut self, player_id: PlayerId) -> LeaveOutcome {
        if self.status.is_terminal() {
            return LeaveOutcome::ABSENT;
        }
        let Some(index) = self.position(player_id) else {
            return LeaveOutcome::ABSENT;
        };
        self.members.remove(index);
        self.ready.retain(|id| *id != player_id);
        self.bump();

        if self.members.is_empty() {
            self.status = RoomStatus::Finished;
            self.pending.push(RoomEvent::PlayerLeft {
                room_id: self.id,
                game_id: self.game_id.clone(),
                player_id,
                new_owner: None,
                player_count: 0,
            });
            self.pending.push(RoomEvent::Destroyed {
                room_id: self.id,
                game_id: self.game_id.clone(),
                reason: DestroyReason::Dissolved,
                members: Vec::new(),
            });
            return LeaveOutcome {
                left: true,
                room_destroyed: true,
                new_owner: None,
            };
        }

        let new_owner = (self.owner == player_id).then(|| {
            self.owner = self.members[0].id;
            self.owner
        });
        self.pending.push(RoomEvent::PlayerLeft {
            room_id: self.id,
            game_id: self.game_id.clone(),
            player_id,
            new_owner,
            player_count: self.members.len(),
        });
        LeaveOutcome {
            left: true,
            room_destroyed: false,
            new_owner,
        }
    }

    pub(crate) fn kick(&mut self, requester: PlayerId, target: PlayerId) -> Result<(), RoomError> {
        self.ensure_live("kick from")?;
        self.ensure_owner(requester)?;
        if requester == target {
            return Err(RoomError::CannotKickSelf);
        }
        let index = self
            .position(target)
            .ok_or(RoomError::NotInRoom(target, self.id))?;

        self.members.remove(index);
        self.ready.retain(|id| *id != target);
        self.bump();
        self.pending.push(RoomEvent::PlayerKicked {
            room_id: self.id,
            game_id: self.game_id.clone(),
            player_id: target,
            player_count: self.members.len(),
        });
        Ok(())
    }

    /// `waiting → loading`, owner only, with at least `capacity.min`
    /// members present.
    pub(crate) fn start(&mut self, requester: PlayerId) -> Result<(), RoomError> {
        self.ensure_owner(requester)?;
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState {
                room: self.id,
                status: self.status,
                operation: "start",
            });
        }
        if self.members.len() < self.capacity.min {
            return Err(RoomError::InsufficientPlayers {
                room: self.id,
                have: self.members.len(),
                need: self.capacity.min,
            });
        }

        let started_at = unix_millis();
        self.transition(RoomStatus::Loading);
        self.started_at = Some(started_at);
        self.pending.push(RoomEvent::GameStarted {
            room_id: self.id,
            game_id: self.game_id.clone(),
            player_count: self.members.len(),
            started_at,
        });
        Ok(())
    }

    /// `loading → playing`.
    pub(crate) fn mark_playing(&mut self) -> Result<(), RoomError> {
        if self.status != RoomStatus::Loading {
            return Err(RoomError::InvalidState {
                room: self.id,
                status: self.status,
                operation: "mark playing",
            });
        }
        self.transition(RoomStatus::Playing);
        Ok(())
    }

    pub(crate) fn close(&mut self, requester: CloseRequester) -> Result<CloseOutcome, RoomError> {
        if self.status.is_terminal() {
            return Ok(CloseOutcome::AlreadyClosed);
        }
        if let CloseRequester::Player(player_id) = requester {
            self.ensure_owner(player_id)?;
        }

        self.transition(RoomStatus::Finished);
        self.pending.push(RoomEvent::Destroyed {
            room_id: self.id,
            game_id: self.game_id.clone(),
            reason: DestroyReason::Closed,
            members: self.members.iter().map(|m| m.id).collect(),
        });
        Ok(CloseOutcome::Closed)
    }

    /// Shallow-merges `patch` into the settings map.
    pub(crate) fn update_settings(
        &mut self,
        requester: PlayerId,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), RoomError> {
        self.ensure_live("update settings of")?;
        self.ensure_owner(requester)?;

        self.settings.extend(patch);
        self.bump();
        self.pending.push(RoomEvent::SettingsUpdated {
            room_id: self.id,
            settings: self.settings.clone(),
        });
        Ok(())
    }

    /// Marks a member ready or not while the room waits. Returns
    /// `Ok(false)` when nothing changed.
    pub(crate) fn set_ready(
        &mut self,
        player_id: PlayerId,
        ready: bool,
    ) -> Result<bool, RoomError> {
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState {
                room: self.id,
                status: self.status,
                operation: "ready up in",
            });
        }
        if self.position(player_id).is_none() {
            return Err(RoomError::NotInRoom(player_id, self.id));
        }
        if self.ready.contains(&player_id) == ready {
            return Ok(false);
        }

        if ready {
            self.ready.push(player_id);
        } else {
            self.ready.retain(|id| *id != player_id);
        }
        self.bump();
        self.pending.push(RoomEvent::ReadyChanged {
            room_id: self.id,
            player_id,
            ready,
            room_ready: all_ready(self.status, &self.members, &self.ready, self.capacity),
        });
        Ok(true)
    }

    /// Queues a chat line from a member. Chat is not room state: nothing
    /// is bumped and nothing is persisted.
    pub(crate) fn message(&mut self, player_id: PlayerId, text: &str) -> Result<(), RoomError> {
        self.ensure_live("send a message to")?;
        let text = text.trim();
        if text.is_empty() {
            return Err(RoomError::EmptyMessage);
        }
        let member = self
            .members
            .iter()
            .find(|m| m.id == player_id)
            .ok_or(RoomError::NotInRoom(player_id, self.id))?;

        self.pending.push(RoomEvent::Message {
            room_id: self.id,
            player_id,
            display_name: member.display_name.clone(),
            message: text.to_owned(),
            sent_at: unix_millis(),
        });
        Ok(())
    }

    // -- helpers ------------------------------------------------------------

    fn position(&self, player_id: PlayerId) -> Option<usize> {
        self.members.iter().position(|m| m.id == player_id)
    }

    fn ensure_owner(&self, player_id: PlayerId) -> Result<(), RoomError> {
        if self.owner != player_id {
            return Err(RoomError::NotOwner {
                room: self.id,
                player: player_id,
            });
        }
        Ok(())
    }

    fn ensure_live(&self, operation: &'static str) -> Result<(), RoomError> {
        if self.status.is_terminal() {
            return Err(RoomError::InvalidState {
                room: self.id,
                status: self.status,
                operation,
            });
        }
        Ok(())
    }

    fn transition(&mut self, target: RoomStatus) {
        debug_assert!(self.status.can_transition_to(target));
        self.status = target;
        self.bump();
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}
