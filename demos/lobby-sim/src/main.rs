//! A few scripted players walking through the lobby: browsing, creating
//! and joining rooms, matchmaking, dropping out. Run with
//! `RUST_LOG=debug` to see every presence delivery.

use std::time::Duration;

use gamehall::presence::{MemoryTransport, PresenceError, Transport};
use gamehall::protocol::{
    Capacity, Codec, Envelope, Game, GameId, Genre, JsonCodec, MatchMode, Player, PlayerId, Topic,
    UserId,
};
use gamehall::{
    CreateRoomRequest, JoinQueueRequest, JoinRoomRequest, Lobby, LobbyConfig, LobbyError,
    MemoryCache, MemoryStore, OwnerRequest, SendMessageRequest, SetReadyRequest,
};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Delivers in memory and logs what each topic receives.
#[derive(Default)]
struct LoggingTransport {
    inner: MemoryTransport,
}

impl Transport for LoggingTransport {
    async fn emit(&self, topic: &Topic, payload: &[u8]) -> Result<(), PresenceError> {
        match JsonCodec.decode::<Envelope>(payload) {
            Ok(envelope) => {
                tracing::debug!(%topic, seq = envelope.seq, event = envelope.event.name(), "emit");
            }
            Err(error) => tracing::warn!(%topic, %error, "undecodable payload"),
        }
        self.inner.emit(topic, payload).await
    }

    async fn subscribe(&self, player: PlayerId, topic: &Topic) -> Result<(), PresenceError> {
        tracing::trace!(%player, %topic, "subscribe");
        self.inner.subscribe(player, topic).await
    }

    async fn unsubscribe(&self, player: PlayerId, topic: &Topic) -> Result<(), PresenceError> {
        tracing::trace!(%player, %topic, "unsubscribe");
        self.inner.unsubscribe(player, topic).await
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

async fn seed() -> MemoryStore {
    let store = MemoryStore::new();
    for (id, name, genre, min, max) in [
        ("chess", "Chess", Genre::Card, 2, 2),
        ("arena", "Arena", Genre::Moba, 2, 6),
    ] {
        store
            .insert_game(Game {
                id: GameId::from(id),
                name: name.into(),
                genre,
                players: Capacity::new(min, max),
            })
            .await;
    }
    for (id, name) in [(1, "ada"), (2, "bo"), (3, "cy"), (4, "dee"), (5, "eli")] {
        store
            .insert_player(Player {
                id: PlayerId(id),
                user_id: UserId(1000 + id),
                display_name: name.into(),
                level: 1,
                score: 0,
                online: false,
                current_room: None,
            })
            .await;
    }
    store
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), LobbyError> {
    gamehall::telemetry::init();

    let mut config = LobbyConfig::from_env();
    config.presence.reconnect_grace = Duration::from_secs(2);
    config.sweep_interval = Duration::from_millis(500);

    let store = seed().await;
    let lobby = Lobby::with_store(
        config,
        store.clone(),
        store.clone(),
        MemoryCache::new(),
        LoggingTransport::default(),
    )?;

    for game in lobby.list_games().await? {
        tracing::info!(game_id = %game.id, name = %game.name, "game available");
    }
    for id in 1..=5 {
        lobby.connect(PlayerId(id)).await?;
    }

    // ada opens a private arena room; bo knows the password, cy does not.
    let room = lobby
        .create_room(
            CreateRoomRequest::new(PlayerId(1), GameId::from("arena"), "ada's arena")
                .private("open sesame"),
        )
        .await?
        .room;
    lobby
        .join_room(JoinRoomRequest {
            player_id: PlayerId(2),
            room_id: room.id,
            password: Some("open sesame".into()),
        })
        .await?;
    if let Err(error) = lobby
        .join_room(JoinRoomRequest {
            player_id: PlayerId(3),
            room_id: room.id,
            password: None,
        })
        .await
    {
        tracing::info!(%error, kind = ?error.kind(), "cy was turned away");
    }
    lobby
        .send_message(SendMessageRequest {
            player_id: PlayerId(2),
            room_id: room.id,
            message: "glhf".into(),
        })
        .await?;
    for id in [1, 2] {
        let ready = lobby
            .set_ready(SetReadyRequest {
                player_id: PlayerId(id),
                room_id: room.id,
                ready: true,
            })
            .await?;
        tracing::info!(player = id, room_ready = ready.room.is_ready(), "readied up");
    }

    // dee and eli look for a chess match.
    for id in [4, 5] {
        let queued = lobby
            .join_queue(JoinQueueRequest {
                player_id: PlayerId(id),
                game_id: GameId::from("chess"),
                mode: MatchMode::Ranked,
            })
            .await?;
        tracing::info!(player = id, position = queued.position, "queued for chess");
    }
    tokio::time::sleep(Duration::from_millis(1500)).await;
    for summary in lobby.list_rooms(&GameId::from("chess")).await {
        tracing::info!(
            room_id = %summary.room_id,
            name = %summary.name,
            players = summary.player_count,
            "chess room"
        );
    }

    // ada starts, then drops and never comes back; bo inherits the room.
    let owner = OwnerRequest {
        player_id: PlayerId(1),
        room_id: room.id,
    };
    lobby.start_game(owner).await?;
    lobby.mark_playing(room.id).await?;
    lobby.disconnect(PlayerId(1)).await?;
    tokio::time::sleep(Duration::from_secs(3)).await;
    let info = lobby.room_info(room.id).await?;
    tracing::info!(owner = %info.owner, status = %info.status, "arena after ada's forfeit");

    let stats = lobby.room_stats().await;
    match serde_json::to_string(&stats) {
        Ok(json) => tracing::info!(stats = %json, "room stats"),
        Err(error) => tracing::warn!(%error, "could not encode room stats"),
    }
    if let Some(stored) = store.stored_room(room.id).await {
        tracing::info!(version = stored.version, "arena as persisted");
    }

    lobby.close_room_as_system(room.id).await?;
    lobby.shutdown().await;
    Ok(())
}
