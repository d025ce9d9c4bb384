//! Per-game FIFO matchmaking queue.
//!
//! [`MatchmakingQueue`] is plain data, like a session table: it has no
//! locks and no tasks. Exclusive access (`&mut self`) is what makes
//! `try_match` atomic; the [`Matchmaker`](crate::Matchmaker) wraps it in
//! a mutex to share it.
//!
//! Each game's line is kept sorted by `(enqueued_at, seq)`. The sequence
//! number breaks ties between requests stamped with the same instant.

use std::collections::HashMap;
use std::time::Duration;

use gamehall_protocol::{GameId, MatchMode, PlayerId, RoomMember};
use tokio::time::Instant;

use crate::{GroupPolicy, RequeuePolicy};

/// One player waiting to be matched for one game.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRequest {
    pub player: RoomMember,
    pub game_id: GameId,
    pub mode: MatchMode,
    pub enqueued_at: Instant,
    pub seq: u64,
}

impl MatchRequest {
    pub fn player_id(&self) -> PlayerId {
        self.player.id
    }

    fn order_key(&self) -> (Instant, u64) {
        (self.enqueued_at, self.seq)
    }
}

/// A snapshot of one game's line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub game_id: GameId,
    pub queue_size: usize,
    /// How long the oldest request has been waiting. Zero when empty.
    pub longest_wait: Duration,
}

/// Per-game lines of [`MatchRequest`]s.
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    queues: HashMap<GameId, Vec<MatchRequest>>,
    next_seq: u64,
    requeue: RequeuePolicy,
    group: GroupPolicy,
}

impl MatchmakingQueue {
    /// An empty queue with the default policies.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(requeue: RequeuePolicy, group: GroupPolicy) -> Self {
        Self {
            requeue,
            group,
            ..Self::default()
        }
    }

    /// Queues `player` for `game_id`, stamped now.
    ///
    /// Returns `true` if an existing request for the same player and game
    /// was replaced instead of a new one added.
    pub fn enqueue(&mut self, player: RoomMember, game_id: GameId, mode: MatchMode) -> bool {
        self.enqueue_at(player, game_id, mode, Instant::now())
    }

    /// [`enqueue`](Self::enqueue) with an explicit timestamp.
    pub fn enqueue_at(
        &mut self,
        player: RoomMember,
        game_id: GameId,
        mode: MatchMode,
        now: Instant,
    ) -> bool {
        let seq = self.next_seq;
        self.next_seq += 1;
        let line = self.queues.entry(game_id.clone()).or_default();

        let existing = line.iter().position(|r| r.player.id == player.id);
        if let (Some(index), RequeuePolicy::PreserveWait) = (existing, self.requeue) {
            let request = &mut line[index];
            request.player = player;
            request.mode = mode;
            return true;
        }
        if let Some(index) = existing {
            line.remove(index);
        }

        let request = MatchRequest {
            player,
            game_id,
            mode,
            enqueued_at: now,
            seq,
        };
        let at = line.partition_point(|r| r.order_key() <= request.order_key());
        line.insert(at, request);
        existing.is_some()
    }

    /// Removes the player's request for `game_id`, if any.
    pub fn dequeue(&mut self, game_id: &GameId, player_id: PlayerId) -> Option<MatchRequest> {
        let line = self.queues.get_mut(game_id)?;
        let index = line.iter().position(|r| r.player.id == player_id)?;
        let removed = line.remove(index);
        if line.is_empty() {
            self.queues.remove(game_id);
        }
        Some(removed)
    }

    /// Removes the player from every game's line.
    pub fn dequeue_everywhere(&mut self, player_id: PlayerId) -> Vec<MatchRequest> {
        let mut removed = Vec::new();
        for line in self.queues.values_mut() {
            if let Some(index) = line.iter().position(|r| r.player.id == player_id) {
                removed.push(line.remove(index));
            }
        }
        self.queues.retain(|_, line| !line.is_empty());
        removed.sort_by(|a, b| a.game_id.cmp(&b.game_id));
        removed
    }

    /// Takes the oldest `group_size` requests for `game_id`, if a match
    /// can be formed now.
    pub fn try_match(
        &mut self,
        game_id: &GameId,
        group_size: usize,
        max_wait: Duration,
    ) -> Option<Vec<MatchRequest>> {
        self.try_match_at(game_id, group_size, max_wait, Instant::now())
    }

    /// [`try_match`](Self::try_match) evaluated at `now`.
    ///
    /// A full group is always taken. Under [`GroupPolicy::Lenient`], once
    /// the oldest request has waited at least `max_wait`, everything queued
    /// (at least one request) is taken instead. The selected requests are
    /// removed before this returns.
    pub fn try_match_at(
        &mut self,
        game_id: &GameId,
        group_size: usize,
        max_wait: Duration,
        now: Instant,
    ) -> Option<Vec<MatchRequest>> {
        if group_size == 0 {
            return None;
        }
        let line = self.queues.get_mut(game_id)?;
        let oldest = line.first()?;

        let take = if line.len() >= group_size {
            group_size
        } else if self.group == GroupPolicy::Lenient
            && now.saturating_duration_since(oldest.enqueued_at) >= max_wait
        {
            line.len()
        } else {
            return None;
        };

        let matched: Vec<MatchRequest> = line.drain(..take).collect();
        if line.is_empty() {
            self.queues.remove(game_id);
        }
        Some(matched)
    }

    /// Puts previously taken requests back at their original place in line.
    ///
    /// Requests whose player has queued again for the same game in the
    /// meantime are dropped; the newer request wins.
    pub fn restore(&mut self, requests: Vec<MatchRequest>) {
        for request in requests {
            let line = self.queues.entry(request.game_id.clone()).or_default();
            if line.iter().any(|r| r.player.id == request.player.id) {
                continue;
            }
            let at = line.partition_point(|r| r.order_key() <= request.order_key());
            line.insert(at, request);
        }
    }

    // -- queries ------------------------------------------------------------

    pub fn queue_info(&self, game_id: &GameId) -> QueueInfo {
        self.queue_info_at(game_id, Instant::now())
    }

    pub fn queue_info_at(&self, game_id: &GameId, now: Instant) -> QueueInfo {
        let line = self.queues.get(game_id);
        QueueInfo {
            game_id: game_id.clone(),
            queue_size: line.map_or(0, Vec::len),
            longest_wait: line
                .and_then(|l| l.first())
                .map_or(Duration::ZERO, |r| now.saturating_duration_since(r.enqueued_at)),
        }
    }

    /// Info for every game with someone waiting, ordered by game id.
    pub fn all_queue_info(&self) -> Vec<QueueInfo> {
        let now = Instant::now();
        let mut infos: Vec<QueueInfo> = self
            .queues
            .keys()
            .map(|game_id| self.queue_info_at(game_id, now))
            .collect();
        infos.sort_by(|a, b| a.game_id.cmp(&b.game_id));
        infos
    }

    /// The player's place in line, 1 being next.
    pub fn position(&self, game_id: &GameId, player_id: PlayerId) -> Option<usize> {
        self.queues
            .get(game_id)?
            .iter()
            .position(|r| r.player.id == player_id)
            .map(|i| i + 1)
    }

    pub fn len(&self, game_id: &GameId) -> usize {
        self.queues.get(game_id).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, game_id: &GameId) -> bool {
        self.len(game_id) == 0
    }

    pub fn is_queued(&self, game_id: &GameId, player_id: PlayerId) -> bool {
        self.position(game_id, player_id).is_some()
    }

    /// Games with at least one request waiting.
    pub fn games(&self) -> Vec<GameId> {
        let mut games: Vec<GameId> = self.queues.keys().cloned().collect();
        games.sort();
        games
    }
}
