//! Turns matched groups into rooms.

use std::sync::Arc;
use std::time::Duration;

use gamehall_matchmaking::{MatchError, MatchGroup, MatchSink};
use gamehall_protocol::{Capacity, ErrorKind, Game, MatchMode};
use gamehall_room::{NewRoom, RoomOrigin, RoomRegistry};
use serde_json::json;

use crate::catalog::{Catalog, read_with_retry};

/// The [`MatchSink`] the lobby hands to its matchmaker: every group
/// becomes a new room, owned by the longest-waiting player, with the rest
/// of the group seeded as members.
pub struct RoomMaker<C> {
    registry: Arc<RoomRegistry>,
    catalog: Arc<C>,
    backoff: Duration,
}

impl<C: Catalog> RoomMaker<C> {
    pub(crate) fn new(registry: Arc<RoomRegistry>, catalog: Arc<C>, backoff: Duration) -> Self {
        Self {
            registry,
            catalog,
            backoff,
        }
    }
}

impl<C: Catalog> MatchSink for RoomMaker<C> {
    async fn matched(&self, group: MatchGroup) -> Result<(), MatchError> {
        let game = read_with_retry(self.backoff, "game", || self.catalog.game(&group.game_id))
            .await
            .map_err(|e| delivery(e.kind(), e))?
            .ok_or_else(|| {
                delivery(ErrorKind::NotFound, format!("game {} not found", group.game_id))
            })?;

        let new = matched_room(&game, &group)?;
        let room = self
            .registry
            .create_room(new)
            .await
            .map_err(|e| delivery(e.kind(), e))?;

        tracing::info!(
            room_id = %room.id,
            game_id = %room.game_id,
            mode = %group.mode,
            players = room.player_count(),
            "matched room created"
        );
        Ok(())
    }
}

fn delivery(kind: ErrorKind, reason: impl ToString) -> MatchError {
    MatchError::Delivery {
        kind,
        reason: reason.to_string(),
    }
}

/// The room a group gets. Bounds follow the game but always fit the
/// group, so a short lenient group can still start.
fn matched_room(game: &Game, group: &MatchGroup) -> Result<NewRoom, MatchError> {
    let mut members = group.members().into_iter();
    let owner = members
        .next()
        .ok_or_else(|| delivery(ErrorKind::Validation, "empty match group"))?;
    let size = group.requests.len();
    let capacity = Capacity::new(game.players.min.min(size), game.players.max.max(size));

    let mut new = NewRoom::new(group.game_id.clone(), match_name(group.mode), owner, capacity);
    new.members = members.collect();
    new.origin = RoomOrigin::Matchmaking { mode: group.mode };
    if let serde_json::Value::Object(settings) = json!({ "mode": group.mode }) {
        new.settings = settings;
    }
    Ok(new)
}

fn match_name(mode: MatchMode) -> &'static str {
    match mode {
        MatchMode::Ranked => "Ranked Match",
        MatchMode::Casual => "Casual Match",
        MatchMode::Team => "Team Match",
    }
}
