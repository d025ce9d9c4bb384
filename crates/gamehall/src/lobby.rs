//! The lobby: one entry point over rooms, matchmaking, and presence.
//!
//! ```text
//!                ┌──────────── Lobby ─────────────┐
//!  requests ───→ │ RoomRegistry    Matchmaker     │
//!                │      │   ↑ RoomMaker  │        │
//!                │      └───┴────┬───────┘        │
//!                │   RoomEvent / QueueEvent       │
//!                │               ↓                │
//!                │  presence pump → Dispatcher ───┼──→ Transport
//!                └────────────────────────────────┘
//! ```
//!
//! Every operation validates its request, resolves catalog records
//! (retrying a failed read once), and then delegates to the layer that
//! owns the state. Presence is never awaited by a room or queue
//! operation; the pump delivers events in the background.

use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use gamehall_matchmaking::Matchmaker;
use gamehall_presence::{
    ConnectionChange, ConnectionTracker, Dispatcher, MemoryTransport, PresenceBroadcaster,
    Transport,
};
use gamehall_protocol::{
    Game, GameId, PlayerId, RoomId, RoomMember, RoomSummary, unix_millis,
};
use gamehall_room::{
    CloseOutcome, CloseRequester, NewRoom, RoomError, RoomRegistry, RoomSnapshot, RoomStats,
    RoomStore,
};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::catalog::{Catalog, NoCache, StatsCache, read_with_retry};
use crate::matched::RoomMaker;
use crate::pump::spawn_presence_pump;
use crate::request::*;
use crate::{LobbyConfig, LobbyError};

/// Settings every lobby-created room starts with.
fn default_settings() -> Settings {
    match json!({ "difficulty": "normal", "mode": "casual" }) {
        serde_json::Value::Object(map) => map,
        _ => Settings::new(),
    }
}

/// The lobby service. Cheap to clone; clones share state.
///
/// Must be created inside a Tokio runtime: construction spawns the
/// presence pump and the connection sweeper.
pub struct Lobby<C: Catalog, T: Transport = MemoryTransport, K: StatsCache = NoCache> {
    shared: Arc<Shared<C, T, K>>,
}

impl<C: Catalog, T: Transport, K: StatsCache> Clone for Lobby<C, T, K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<C: Catalog, T: Transport, K: StatsCache> {
    config: LobbyConfig,
    catalog: Arc<C>,
    cache: K,
    registry: Arc<RoomRegistry>,
    matchmaker: Matchmaker<RoomMaker<C>>,
    presence: Arc<Dispatcher<T>>,
    connections: Mutex<ConnectionTracker>,
    pump: JoinHandle<()>,
    sweeper: OnceLock<JoinHandle<()>>,
}

impl<C: Catalog, T: Transport> Lobby<C, T, NoCache> {
    /// A lobby with no room store and no stats cache.
    pub fn new(config: LobbyConfig, catalog: C, transport: T) -> Result<Self, LobbyError> {
        let registry = RoomRegistry::new(config.registry.clone());
        Self::assemble(config, catalog, registry, NoCache, transport)
    }
}

impl<C: Catalog, T: Transport, K: StatsCache> Lobby<C, T, K> {
    /// A lobby that persists every committed room version to `store` and
    /// caches aggregate stats in `cache`.
    pub fn with_store<S: RoomStore>(
        config: LobbyConfig,
        catalog: C,
        store: S,
        cache: K,
        transport: T,
    ) -> Result<Self, LobbyError> {
        let registry = RoomRegistry::with_store(config.registry.clone(), store);
        Self::assemble(config, catalog, registry, cache, transport)
    }

    fn assemble(
        config: LobbyConfig,
        catalog: C,
        registry: RoomRegistry,
        cache: K,
        transport: T,
    ) -> Result<Self, LobbyError> {
        let catalog = Arc::new(catalog);
        let registry = Arc::new(registry);
        let sink = RoomMaker::new(
            Arc::clone(&registry),
            Arc::clone(&catalog),
            config.catalog_retry_backoff,
        );
        let matchmaker = Matchmaker::new(config.matching.clone(), sink)?;
        let presence = Arc::new(Dispatcher::new(transport));
        let pump = spawn_presence_pump(
            Arc::clone(&presence),
            registry.subscribe(),
            matchmaker.subscribe(),
        );

        let shared = Arc::new(Shared {
            connections: Mutex::new(ConnectionTracker::new(config.presence.clone())),
            config,
            catalog,
            cache,
            registry,
            matchmaker,
            presence,
            pump,
            sweeper: OnceLock::new(),
        });
        let sweeper = spawn_sweeper(Arc::downgrade(&shared), shared.config.sweep_interval);
        let _ = shared.sweeper.set(sweeper);

        tracing::info!("lobby started");
        Ok(Self { shared })
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.shared.registry
    }

    pub fn transport(&self) -> &T {
        self.shared.presence.transport()
    }

    // =====================================================================
    // Rooms
    // =====================================================================

    /// Creates a room for `game_id` with the requesting player as owner.
    /// The room's bounds come from the game.
    pub async fn create_room(
        &self,
        req: CreateRoomRequest,
    ) -> Result<CreateRoomResponse, LobbyError> {
        if req.name.trim().is_empty() {
            return Err(rejected(
                "create_room",
                LobbyError::Validation("room name must not be empty".into()),
            ));
        }
        if req.is_private && req.password.as_deref().is_none_or(str::is_empty) {
            return Err(rejected(
                "create_room",
                LobbyError::Validation("a private room needs a password".into()),
            ));
        }

        let player = self.player(req.player_id).await?;
        let game = self.game(&req.game_id).await?;

        let mut new = NewRoom::new(game.id, req.name, RoomMember::from(&player), game.players);
        new.settings = default_settings();
        new.settings.extend(req.settings.unwrap_or_default());
        if req.is_private {
            new.is_private = true;
            new.password = req.password;
        }

        let room = self
            .shared
            .registry
            .create_room(new)
            .await
            .map_err(|e| rejected("create_room", e.into()))?;
        self.drop_queues(req.player_id).await;
        Ok(CreateRoomResponse { room })
    }

    /// Joins a room. Re-joining a room the player is already in succeeds
    /// without changing it; a player seated in another unfinished room is
    /// refused. Taking a seat cancels the player's matchmaking requests.
    pub async fn join_room(&self, req: JoinRoomRequest) -> Result<JoinRoomResponse, LobbyError> {
        let player = self.player(req.player_id).await?;
        let outcome = self
            .shared
            .registry
            .join_room(req.room_id, RoomMember::from(&player), req.password)
            .await
            .map_err(|e| rejected("join_room", e.into()))?;
        if outcome.is_new() {
            self.drop_queues(req.player_id).await;
        }
        Ok(JoinRoomResponse {
            already_member: !outcome.is_new(),
            room: outcome.into_room(),
        })
    }

    /// Leaves a room. Never fails; `left` is `false` when there was
    /// nothing to leave.
    pub async fn leave_room(&self, req: LeaveRoomRequest) -> LeaveRoomResponse {
        let outcome = self.shared.registry.leave_room(req.room_id, req.player_id).await;
        LeaveRoomResponse {
            left: outcome.left,
            room_destroyed: outcome.room_destroyed,
            new_owner: outcome.new_owner,
        }
    }

    pub async fn start_game(&self, req: OwnerRequest) -> Result<RoomResponse, LobbyError> {
        let room = self
            .shared
            .registry
            .start_game(req.room_id, req.player_id)
            .await
            .map_err(|e| rejected("start_game", e.into()))?;
        Ok(RoomResponse { room })
    }

    /// Reported by the game session once every client has loaded.
    pub async fn mark_playing(&self, room_id: RoomId) -> Result<RoomResponse, LobbyError> {
        let room = self.shared.registry.mark_playing(room_id).await?;
        Ok(RoomResponse { room })
    }

    pub async fn close_room(&self, req: OwnerRequest) -> Result<CloseRoomResponse, LobbyError> {
        self.close(req.room_id, CloseRequester::Player(req.player_id))
            .await
    }

    /// Closes a room regardless of owner, e.g. when its session ends.
    pub async fn close_room_as_system(
        &self,
        room_id: RoomId,
    ) -> Result<CloseRoomResponse, LobbyError> {
        self.close(room_id, CloseRequester::System).await
    }

    async fn close(
        &self,
        room_id: RoomId,
        requester: CloseRequester,
    ) -> Result<CloseRoomResponse, LobbyError> {
        let outcome = self
            .shared
            .registry
            .close_room(room_id, requester)
            .await
            .map_err(|e| rejected("close_room", e.into()))?;
        Ok(CloseRoomResponse {
            closed: outcome == CloseOutcome::Closed,
        })
    }

    pub async fn kick_player(&self, req: KickRequest) -> Result<RoomResponse, LobbyError> {
        let room = self
            .shared
            .registry
            .kick_player(req.room_id, req.player_id, req.target)
            .await
            .map_err(|e| rejected("kick_player", e.into()))?;
        Ok(RoomResponse { room })
    }

    pub async fn update_settings(
        &self,
        req: UpdateSettingsRequest,
    ) -> Result<RoomResponse, LobbyError> {
        let room = self
            .shared
            .registry
            .update_settings(req.room_id, req.player_id, req.settings)
            .await
            .map_err(|e| rejected("update_settings", e.into()))?;
        Ok(RoomResponse { room })
    }

    /// Toggles the player's ready flag while the room waits. Members hear
    /// whether the whole room is now ready.
    pub async fn set_ready(&self, req: SetReadyRequest) -> Result<RoomResponse, LobbyError> {
        let room = self
            .shared
            .registry
            .set_ready(req.room_id, req.player_id, req.ready)
            .await
            .map_err(|e| rejected("set_ready", e.into()))?;
        Ok(RoomResponse { room })
    }

    /// Relays a chat line to the room. Only members may talk.
    pub async fn send_message(
        &self,
        req: SendMessageRequest,
    ) -> Result<SendMessageResponse, LobbyError> {
        self.shared
            .registry
            .send_message(req.room_id, req.player_id, req.message)
            .await
            .map_err(|e| rejected("send_message", e.into()))?;
        Ok(SendMessageResponse {
            sent_at: unix_millis(),
        })
    }

    pub async fn room_info(&self, room_id: RoomId) -> Result<RoomSnapshot, LobbyError> {
        self.shared
            .registry
            .room_info(room_id)
            .await
            .ok_or(LobbyError::Room(RoomError::NotFound(room_id)))
    }

    /// The listing for one game: every room that hasn't finished.
    pub async fn list_rooms(&self, game_id: &GameId) -> Vec<RoomSummary> {
        self.shared
            .registry
            .rooms_for_game(game_id)
            .await
            .iter()
            .map(RoomSnapshot::summary)
            .collect()
    }

    pub async fn list_games(&self) -> Result<Vec<Game>, LobbyError> {
        let catalog = &self.shared.catalog;
        Ok(read_with_retry(self.backoff(), "games", || catalog.games()).await?)
    }

    /// Live room counts, served from the cache while fresh.
    pub async fn room_stats(&self) -> RoomStats {
        match self.shared.cache.get_room_stats().await {
            Ok(Some(stats)) => return stats,
            Ok(None) => {}
            Err(error) => tracing::warn!(%error, "stats cache read failed"),
        }
        let stats = self.shared.registry.stats().await;
        if let Err(error) = self
            .shared
            .cache
            .put_room_stats(stats, self.shared.config.stats_ttl)
            .await
        {
            tracing::warn!(%error, "stats cache write failed");
        }
        stats
    }

    // =====================================================================
    // Matchmaking
    // =====================================================================

    /// Queues the player for a match in `game_id`. A player seated in an
    /// unfinished room must leave it first.
    pub async fn join_queue(&self, req: JoinQueueRequest) -> Result<JoinQueueResponse, LobbyError> {
        let player = self.player(req.player_id).await?;
        let game = self.game(&req.game_id).await?;
        if let Some(room) = self.shared.registry.player_room(req.player_id).await {
            return Err(rejected(
                "join_queue",
                RoomError::AlreadyInRoom {
                    player: req.player_id,
                    room,
                }
                .into(),
            ));
        }
        let enqueued = self
            .shared
            .matchmaker
            .enqueue(RoomMember::from(&player), game.id, req.mode)
            .await;
        Ok(JoinQueueResponse {
            position: enqueued.position,
            queue_size: enqueued.queue_size,
            replaced: enqueued.replaced,
        })
    }

    pub async fn leave_queue(&self, req: LeaveQueueRequest) -> LeaveQueueResponse {
        let removed = self
            .shared
            .matchmaker
            .dequeue(&req.game_id, req.player_id)
            .await;
        LeaveQueueResponse {
            left: removed.is_some(),
        }
    }

    pub async fn queue_info(&self, game_id: &GameId) -> QueueInfoResponse {
        self.shared.matchmaker.queue_info(game_id).await.into()
    }

    pub async fn all_queue_info(&self) -> Vec<QueueInfoResponse> {
        self.shared
            .matchmaker
            .all_queue_info()
            .await
            .into_iter()
            .map(Into::into)
            .collect()
    }

    // =====================================================================
    // Connections
    // =====================================================================

    /// Records a connection. Coming online (or back within the grace
    /// period) is announced to the lobby and the player's room.
    pub async fn connect(&self, player_id: PlayerId) -> Result<ConnectionChange, LobbyError> {
        self.player(player_id).await?;
        let change = self.shared.connections.lock().await.connect(player_id);
        if change.is_announced() {
            self.announce(player_id, true).await;
        }
        Ok(change)
    }

    /// Records a dropped connection and starts its grace period. Returns
    /// `false` if the player was already offline.
    pub async fn disconnect(&self, player_id: PlayerId) -> Result<bool, LobbyError> {
        let dropped = self
            .shared
            .connections
            .lock()
            .await
            .disconnect(player_id)?;
        if dropped {
            self.announce(player_id, false).await;
        }
        Ok(dropped)
    }

    pub async fn is_online(&self, player_id: PlayerId) -> bool {
        self.shared.connections.lock().await.is_online(player_id)
    }

    pub async fn online_count(&self) -> usize {
        self.shared.connections.lock().await.online_count()
    }

    /// Forfeits every player whose grace period has run out: they leave
    /// their room and every matchmaking queue. Returns them, sorted.
    ///
    /// Runs periodically on its own; exposed for callers that want to
    /// sweep on demand.
    pub async fn sweep_connections(&self) -> Vec<PlayerId> {
        let expired = self.shared.connections.lock().await.expire_stale();
        for &player_id in &expired {
            self.shared.matchmaker.dequeue_everywhere(player_id).await;
            if let Some(room_id) = self.shared.registry.player_room(player_id).await {
                let outcome = self.shared.registry.leave_room(room_id, player_id).await;
                tracing::info!(
                    %player_id,
                    %room_id,
                    room_destroyed = outcome.room_destroyed,
                    "player forfeited after grace period"
                );
            }
        }
        let removed = self.shared.connections.lock().await.cleanup_expired();
        if removed > 0 {
            tracing::debug!(removed, "expired connections cleaned up");
        }
        expired
    }

    // =====================================================================
    // Lifecycle
    // =====================================================================

    /// Stops matchmaking, stops every room actor, and stops background
    /// tasks. Rooms are left as they were, not finished; nothing is
    /// announced to their members.
    pub async fn shutdown(&self) {
        if let Some(sweeper) = self.shared.sweeper.get() {
            sweeper.abort();
        }
        self.shared.matchmaker.shutdown().await;
        self.shared.registry.shutdown().await;
        self.shared.pump.abort();
        tracing::info!("lobby shut down");
    }

    // -- helpers ----------------------------------------------------------

    fn backoff(&self) -> Duration {
        self.shared.config.catalog_retry_backoff
    }

    async fn player(&self, id: PlayerId) -> Result<gamehall_protocol::Player, LobbyError> {
        let catalog = &self.shared.catalog;
        read_with_retry(self.backoff(), "player", || catalog.player(id))
            .await?
            .ok_or_else(|| rejected("player lookup", LobbyError::PlayerNotFound(id)))
    }

    async fn game(&self, id: &GameId) -> Result<Game, LobbyError> {
        let catalog = &self.shared.catalog;
        read_with_retry(self.backoff(), "game", || catalog.game(id))
            .await?
            .ok_or_else(|| rejected("game lookup", LobbyError::GameNotFound(id.clone())))
    }

    /// Cancels every matchmaking request of a player who just took a seat.
    async fn drop_queues(&self, player_id: PlayerId) {
        let cancelled = self.shared.matchmaker.dequeue_everywhere(player_id).await;
        if !cancelled.is_empty() {
            tracing::debug!(%player_id, queues = cancelled.len(), "seated player left matchmaking");
        }
    }

    async fn announce(&self, player_id: PlayerId, online: bool) {
        let room = self.shared.registry.player_room(player_id).await;
        let directives =
            PresenceBroadcaster::connection_changed(player_id, online, room, unix_millis());
        self.shared.presence.apply(directives).await;
    }
}

/// Logs a rejected request at debug and hands the error back.
fn rejected(op: &'static str, error: LobbyError) -> LobbyError {
    tracing::debug!(op, %error, kind = ?error.kind(), "request rejected");
    error
}

/// Periodically forfeits expired connections. Holds the lobby weakly so
/// dropping every handle ends the task.
fn spawn_sweeper<C, T, K>(lobby: Weak<Shared<C, T, K>>, period: Duration) -> JoinHandle<()>
where
    C: Catalog,
    T: Transport,
    K: StatsCache,
{
    tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let Some(shared) = lobby.upgrade() else {
                break;
            };
            Lobby { shared }.sweep_connections().await;
        }
    })
}
