//! Room registry: creates rooms, routes operations to their actors, and
//! keeps the player → room index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use gamehall_protocol::{GameId, PlayerId, RoomId, RoomMember, RoomStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast, mpsc};

use crate::room::spawn_room;
use crate::state::Room;
use crate::store::spawn_writer;
use crate::{
    CloseOutcome, CloseRequester, JoinOutcome, LeaveOutcome, NewRoom, RegistryConfig, RoomError,
    RoomEvent, RoomHandle, RoomSnapshot, RoomStore,
};

/// Counts of live rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomStats {
    /// Rooms that have not finished.
    pub active: usize,
    /// Rooms still accepting joins.
    pub waiting: usize,
}

/// A player's place in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seat {
    /// A create or join for this room is in flight.
    Claimed(RoomId),
    /// The player was placed in this room.
    Taken(RoomId),
}

impl Seat {
    fn room_id(self) -> RoomId {
        match self {
            Self::Claimed(room_id) | Self::Taken(room_id) => room_id,
        }
    }
}

/// The authority over every room.
///
/// All operations take `&self` and may be called concurrently through an
/// `Arc<RoomRegistry>`. The maps are locked only long enough to look up
/// or insert a handle; room operations themselves are serialized by each
/// room's actor.
pub struct RoomRegistry {
    config: RegistryConfig,
    next_id: AtomicU64,
    rooms: RwLock<HashMap<RoomId, RoomHandle>>,
    /// Which room each player was last placed in. A player holds one
    /// seat at a time; `Taken` entries are confirmed against the room's
    /// snapshot before they count.
    player_rooms: RwLock<HashMap<PlayerId, Seat>>,
    events: broadcast::Sender<RoomEvent>,
    persist: Option<mpsc::UnboundedSender<RoomSnapshot>>,
}

impl RoomRegistry {
    /// A registry with no durable store.
    pub fn new(config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer);
        Self {
            config,
            next_id: AtomicU64::new(1),
            rooms: RwLock::new(HashMap::new()),
            player_rooms: RwLock::new(HashMap::new()),
            events,
            persist: None,
        }
    }

    /// A registry that writes every committed room version to `store`.
    ///
    /// Must be called inside a Tokio runtime; it spawns the writer task.
    pub fn with_store<S: RoomStore>(config: RegistryConfig, store: S) -> Self {
        let persist = spawn_writer(store, config.persist_timeout);
        Self {
            persist: Some(persist),
            ..Self::new(config)
        }
    }

    /// Subscribes to every room event committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    // -- operations ---------------------------------------------------------

    /// Creates a room in `waiting` with the owner (and any seeded
    /// members) inside.
    ///
    /// Fails with [`RoomError::AlreadyInRoom`] if any of them is still a
    /// member of another unfinished room.
    pub async fn create_room(&self, new: NewRoom) -> Result<RoomSnapshot, RoomError> {
        Room::validate(&new)?;
        let room_id = RoomId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let room = Room::create(room_id, new)?;
        let snapshot = room.snapshot();
        let players = snapshot.member_ids();
        self.claim(&players, room_id).await?;

        let handle = spawn_room(
            room,
            self.config.command_buffer,
            self.events.clone(),
            self.persist.clone(),
        );
        self.rooms.write().await.insert(room_id, handle);
        self.settle(&players, room_id, true).await;

        tracing::info!(
            %room_id,
            game_id = %snapshot.game_id,
            owner = %snapshot.owner,
            players = snapshot.player_count(),
            "room created"
        );
        Ok(snapshot)
    }

    /// Adds a player to a room. A player already seated in another
    /// unfinished room gets [`RoomError::AlreadyInRoom`].
    pub async fn join_room(
        &self,
        room_id: RoomId,
        member: RoomMember,
        password: Option<String>,
    ) -> Result<JoinOutcome, RoomError> {
        let player_id = member.id;
        self.claim(&[player_id], room_id).await?;
        let outcome = match self.handle(room_id).await {
            Ok(handle) => handle.join(member, password).await,
            Err(err) => Err(err),
        };
        self.settle(&[player_id], room_id, outcome.is_ok()).await;
        outcome
    }

    /// Removes a player from a room. Never fails: an unknown room or a
    /// non-member reports `left == false`.
    pub async fn leave_room(&self, room_id: RoomId, player_id: PlayerId) -> LeaveOutcome {
        let Ok(handle) = self.handle(room_id).await else {
            return LeaveOutcome::ABSENT;
        };
        let outcome = handle.leave(player_id).await;
        if outcome.left {
            self.unindex(room_id, &[player_id]).await;
        }
        outcome
    }

    /// Owner-only removal of another member.
    pub async fn kick_player(
        &self,
        room_id: RoomId,
        requester: PlayerId,
        target: PlayerId,
    ) -> Result<RoomSnapshot, RoomError> {
        let room = self.handle(room_id).await?.kick(requester, target).await?;
        self.unindex(room_id, &[target]).await;
        Ok(room)
    }

    /// Owner-only `waiting → loading`.
    pub async fn start_game(
        &self,
        room_id: RoomId,
        requester: PlayerId,
    ) -> Result<RoomSnapshot, RoomError> {
        self.handle(room_id).await?.start(requester).await
    }

    /// `loading → playing`, once clients have loaded.
    pub async fn mark_playing(&self, room_id: RoomId) -> Result<RoomSnapshot, RoomError> {
        self.handle(room_id).await?.mark_playing().await
    }

    pub async fn close_room(
        &self,
        room_id: RoomId,
        requester: CloseRequester,
    ) -> Result<CloseOutcome, RoomError> {
        let handle = self.handle(room_id).await?;
        let outcome = handle.close(requester).await?;
        if outcome == CloseOutcome::Closed {
            self.player_rooms
                .write()
                .await
                .retain(|_, seat| seat.room_id() != room_id);
        }
        Ok(outcome)
    }

    pub async fn update_settings(
        &self,
        room_id: RoomId,
        requester: PlayerId,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<RoomSnapshot, RoomError> {
        self.handle(room_id)
            .await?
            .update_settings(requester, patch)
            .await
    }

    /// Marks a member ready (or not) while the room waits.
    pub async fn set_ready(
        &self,
        room_id: RoomId,
        player_id: PlayerId,
        ready: bool,
    ) -> Result<RoomSnapshot, RoomError> {
        self.handle(room_id).await?.set_ready(player_id, ready).await
    }

    /// Relays a chat line from a member to the room's subscribers.
    pub async fn send_message(
        &self,
        room_id: RoomId,
        player_id: PlayerId,
        text: impl Into<String>,
    ) -> Result<(), RoomError> {
        self.handle(room_id)
            .await?
            .send_message(player_id, text.into())
            .await
    }

    // -- queries ------------------------------------------------------------

    /// The room's latest committed snapshot, without touching its actor.
    pub async fn room_info(&self, room_id: RoomId) -> Option<RoomSnapshot> {
        self.rooms.read().await.get(&room_id).map(RoomHandle::snapshot)
    }

    /// Every unfinished room of one game, oldest first.
    pub async fn rooms_for_game(&self, game_id: &GameId) -> Vec<RoomSnapshot> {
        let mut rooms: Vec<RoomSnapshot> = self
            .rooms
            .read()
            .await
            .values()
            .map(RoomHandle::snapshot)
            .filter(|room| room.game_id == *game_id && !room.status.is_terminal())
            .collect();
        rooms.sort_by_key(|room| room.id);
        rooms
    }

    /// The unfinished room `player_id` is currently a member of.
    pub async fn player_room(&self, player_id: PlayerId) -> Option<RoomId> {
        let seat = self.player_rooms.read().await.get(&player_id).copied()?;
        let Seat::Taken(room_id) = seat else {
            return None;
        };
        self.seated(player_id, room_id).await.then_some(room_id)
    }

    pub async fn stats(&self) -> RoomStats {
        let rooms = self.rooms.read().await;
        rooms
            .values()
            .map(RoomHandle::status)
            .fold(RoomStats::default(), |mut stats, status| {
                if !status.is_terminal() {
                    stats.active += 1;
                }
                if status == RoomStatus::Waiting {
                    stats.waiting += 1;
                }
                stats
            })
    }

    /// Number of rooms held, finished ones included until pruned.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    // -- lifecycle ----------------------------------------------------------

    /// Drops finished rooms from the registry. Returns how many went.
    pub async fn prune_finished(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        let before = rooms.len();
        rooms.retain(|_, handle| !handle.status().is_terminal());
        let pruned = before - rooms.len();
        if pruned > 0 {
            tracing::debug!(pruned, remaining = rooms.len(), "pruned finished rooms");
        }
        pruned
    }

    /// Stops every room actor and forgets every room.
    ///
    /// Rooms are not finished by this; it is a process teardown, not a
    /// close. The persistence writer stops once the registry is dropped.
    pub async fn shutdown(&self) {
        let handles: Vec<RoomHandle> = self.rooms.write().await.drain().map(|(_, h)| h).collect();
        self.player_rooms.write().await.clear();
        for handle in &handles {
            handle.shutdown().await;
        }
        tracing::info!(rooms = handles.len(), "room registry shut down");
    }

    // -- helpers ------------------------------------------------------------

    async fn handle(&self, room_id: RoomId) -> Result<RoomHandle, RoomError> {
        self.rooms
            .read()
            .await
            .get(&room_id)
            .cloned()
            .ok_or(RoomError::NotFound(room_id))
    }

    /// `true` while `player_id` is a member of the unfinished `room_id`.
    async fn seated(&self, player_id: PlayerId, room_id: RoomId) -> bool {
        self.room_info(room_id)
            .await
            .is_some_and(|room| room.contains(player_id) && !room.status.is_terminal())
    }

    /// Reserves `room_id` as the seat of every player in `players`, or
    /// none of them if one is held elsewhere.
    ///
    /// Takes the index lock first and the rooms lock inside it; nothing
    /// takes them in the other order.
    async fn claim(&self, players: &[PlayerId], room_id: RoomId) -> Result<(), RoomError> {
        let mut index = self.player_rooms.write().await;
        for &player_id in players {
            let held = match index.get(&player_id).copied() {
                Some(seat) if seat.room_id() == room_id => false,
                Some(Seat::Claimed(_)) => true,
                Some(Seat::Taken(other)) => self.seated(player_id, other).await,
                None => false,
            };
            if held {
                let room = index.get(&player_id).map_or(room_id, |seat| seat.room_id());
                tracing::debug!(%player_id, %room, target = %room_id, "player already seated");
                return Err(RoomError::AlreadyInRoom {
                    player: player_id,
                    room,
                });
            }
        }
        for &player_id in players {
            if index.get(&player_id) != Some(&Seat::Taken(room_id)) {
                index.insert(player_id, Seat::Claimed(room_id));
            }
        }
        Ok(())
    }

    /// Resolves the claims on `room_id`: taken on success, released on
    /// failure. Seats already taken there are left alone on failure.
    async fn settle(&self, players: &[PlayerId], room_id: RoomId, placed: bool) {
        let mut index = self.player_rooms.write().await;
        for &player_id in players {
            if placed {
                index.insert(player_id, Seat::Taken(room_id));
            } else if index.get(&player_id) == Some(&Seat::Claimed(room_id)) {
                index.remove(&player_id);
            }
        }
    }

    /// Clears the entries of `players` that still point at `room_id`.
    async fn unindex(&self, room_id: RoomId, players: &[PlayerId]) {
        let mut index = self.player_rooms.write().await;
        for player_id in players {
            if index.get(player_id).is_some_and(|seat| seat.room_id() == room_id) {
                index.remove(player_id);
            }
        }
    }
}
