//! Collaborators the lobby reads from: the game and player catalog, and
//! a best-effort cache for aggregate stats.
//!
//! Both are narrow traits. [`MemoryStore`] and [`MemoryCache`] are the
//! in-process implementations used by tests and the demo; a deployment
//! backs them with its own database and cache.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gamehall_protocol::{Game, GameId, Player, PlayerId, RoomId};
use gamehall_room::{PersistenceError, RoomSnapshot, RoomStats, RoomStore, StoreWrite};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Read access to games and players.
pub trait Catalog: Send + Sync + 'static {
    fn game(
        &self,
        id: &GameId,
    ) -> impl Future<Output = Result<Option<Game>, PersistenceError>> + Send;

    fn player(
        &self,
        id: PlayerId,
    ) -> impl Future<Output = Result<Option<Player>, PersistenceError>> + Send;

    /// Every game, sorted by id.
    fn games(&self) -> impl Future<Output = Result<Vec<Game>, PersistenceError>> + Send;
}

/// A cache for room stats. Misses and failures are both survivable: the
/// lobby recomputes from the registry.
pub trait StatsCache: Send + Sync + 'static {
    fn get_room_stats(
        &self,
    ) -> impl Future<Output = Result<Option<RoomStats>, PersistenceError>> + Send;

    fn put_room_stats(
        &self,
        stats: RoomStats,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// A cache that never holds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl StatsCache for NoCache {
    async fn get_room_stats(&self) -> Result<Option<RoomStats>, PersistenceError> {
        Ok(None)
    }

    async fn put_room_stats(&self, _stats: RoomStats, _ttl: Duration) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Runs a catalog read, retrying once after `backoff` if it fails.
pub(crate) async fn read_with_retry<T, F, Fut>(
    backoff: Duration,
    what: &'static str,
    mut read: F,
) -> Result<T, PersistenceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PersistenceError>>,
{
    match read().await {
        Ok(value) => Ok(value),
        Err(error) => {
            tracing::debug!(what, %error, ?backoff, "catalog read failed, retrying once");
            tokio::time::sleep(backoff).await;
            read().await
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory catalog and room store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    games: RwLock<BTreeMap<GameId, Game>>,
    players: RwLock<HashMap<PlayerId, Player>>,
    rooms: RwLock<HashMap<RoomId, RoomSnapshot>>,
    /// Number of upcoming catalog reads to fail.
    failing_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_game(&self, game: Game) {
        self.inner.games.write().await.insert(game.id.clone(), game);
    }

    pub async fn insert_player(&self, player: Player) {
        self.inner.players.write().await.insert(player.id, player);
    }

    /// The latest room version written, if any.
    pub async fn stored_room(&self, id: RoomId) -> Option<RoomSnapshot> {
        self.inner.rooms.read().await.get(&id).cloned()
    }

    /// Makes the next `n` catalog reads fail with
    /// [`PersistenceError::Unavailable`].
    pub fn fail_next_reads(&self, n: usize) {
        self.inner.failing_reads.store(n, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), PersistenceError> {
        let failing = self
            .inner
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match failing {
            Ok(_) => Err(PersistenceError::Unavailable("catalog offline".into())),
            Err(_) => Ok(()),
        }
    }
}

impl Catalog for MemoryStore {
    async fn game(&self, id: &GameId) -> Result<Option<Game>, PersistenceError> {
        self.check_read()?;
        Ok(self.inner.games.read().await.get(id).cloned())
    }

    async fn player(&self, id: PlayerId) -> Result<Option<Player>, PersistenceError> {
        self.check_read()?;
        Ok(self.inner.players.read().await.get(&id).cloned())
    }

    async fn games(&self) -> Result<Vec<Game>, PersistenceError> {
        self.check_read()?;
        Ok(self.inner.games.read().await.values().cloned().collect())
    }
}

impl RoomStore for MemoryStore {
    async fn save(&self, room: &RoomSnapshot) -> Result<StoreWrite, PersistenceError> {
        let mut rooms = self.inner.rooms.write().await;
        match rooms.get(&room.id) {
            Some(stored) if stored.version >= room.version => Ok(StoreWrite::Stale),
            _ => {
                rooms.insert(room.id, room.clone());
                Ok(StoreWrite::Applied)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

/// In-memory [`StatsCache`] honoring the ttl.
#[derive(Debug, Default)]
pub struct MemoryCache {
    room_stats: Mutex<Option<(RoomStats, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatsCache for MemoryCache {
    async fn get_room_stats(&self) -> Result<Option<RoomStats>, PersistenceError> {
        let cached = self.room_stats.lock().await;
        Ok(cached
            .as_ref()
            .filter(|(_, expires)| Instant::now() < *expires)
            .map(|(stats, _)| *stats))
    }

    async fn put_room_stats(&self, stats: RoomStats, ttl: Duration) -> Result<(), PersistenceError> {
        *self.room_stats.lock().await = Some((stats, Instant::now() + ttl));
        Ok(())
    }
}
