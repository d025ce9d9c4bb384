//! The shared matchmaking service.
//!
//! [`Matchmaker`] owns a [`MatchmakingQueue`] behind one mutex together
//! with the table of running tickers. A ticker is started by the first
//! enqueue into an empty game line and stops itself on the first tick
//! that finds the line empty. Both decisions happen under the same lock
//! as the queue mutation, so a waiting request always has a ticker.
//!
//! Matched groups are handed to a [`MatchSink`] after the lock is
//! released. While the sink runs the group is recorded as delivering,
//! and a player who cancels in that window is withdrawn from it. If the
//! sink fails, whoever is left in the group goes back to their original
//! place in line. If it succeeds, the matched players' requests for
//! other games are cancelled.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use gamehall_protocol::{GameId, MatchMode, PlayerId, RoomMember};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use crate::ticker::MatchTicker;
use crate::{MatchConfig, MatchError, MatchRequest, MatchmakingQueue, QueueInfo};

/// Capacity of the queue event broadcast channel.
const EVENT_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A group of requests taken from one game's line.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchGroup {
    pub game_id: GameId,
    /// The oldest request's mode.
    pub mode: MatchMode,
    /// In line order; the first is the longest waiting.
    pub requests: Vec<MatchRequest>,
}

impl MatchGroup {
    pub fn members(&self) -> Vec<RoomMember> {
        self.requests.iter().map(|r| r.player.clone()).collect()
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.requests.iter().map(MatchRequest::player_id).collect()
    }
}

/// Receives matched groups, typically to create their room.
pub trait MatchSink: Send + Sync + 'static {
    fn matched(&self, group: MatchGroup) -> impl Future<Output = Result<(), MatchError>> + Send;
}

/// Queue changes, published for the presence layer.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Queued {
        player_id: PlayerId,
        game_id: GameId,
        mode: MatchMode,
        queue_size: usize,
        replaced: bool,
    },
    Dequeued {
        player_id: PlayerId,
        game_id: GameId,
    },
    Matched {
        game_id: GameId,
        mode: MatchMode,
        players: Vec<PlayerId>,
    },
}

/// Result of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    /// An earlier request for the same player and game was replaced.
    pub replaced: bool,
    /// Place in line, 1 being next.
    pub position: usize,
    pub queue_size: usize,
}

// ---------------------------------------------------------------------------
// Matchmaker
// ---------------------------------------------------------------------------

/// Shared matchmaking service. Cheap to clone.
pub struct Matchmaker<S: MatchSink> {
    shared: Arc<Shared<S>>,
}

impl<S: MatchSink> Clone for Matchmaker<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<S> {
    config: MatchConfig,
    state: Mutex<State>,
    events: broadcast::Sender<QueueEvent>,
    sink: S,
}

struct State {
    queue: MatchmakingQueue,
    tickers: HashMap<GameId, JoinHandle<()>>,
    /// Groups handed to the sink and not yet settled, by delivery number.
    delivering: HashMap<u64, Vec<MatchRequest>>,
    next_delivery: u64,
}

impl State {
    /// Pulls the player's request for `game_id` out of any group still
    /// being delivered.
    fn withdraw(&mut self, game_id: &GameId, player_id: PlayerId) -> Option<MatchRequest> {
        self.delivering.values_mut().find_map(|group| {
            let index = group
                .iter()
                .position(|r| r.game_id == *game_id && r.player_id() == player_id)?;
            Some(group.remove(index))
        })
    }

    fn withdraw_everywhere(&mut self, player_id: PlayerId) -> Vec<MatchRequest> {
        let mut removed = Vec::new();
        for group in self.delivering.values_mut() {
            group.retain(|r| {
                if r.player_id() == player_id {
                    removed.push(r.clone());
                    false
                } else {
                    true
                }
            });
        }
        removed
    }
}

impl<S: MatchSink> Matchmaker<S> {
    pub fn new(config: MatchConfig, sink: S) -> Result<Self, MatchError> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let queue = MatchmakingQueue::with_policies(config.requeue, config.group);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State {
                    queue,
                    tickers: HashMap::new(),
                    delivering: HashMap::new(),
                    next_delivery: 0,
                }),
                events,
                sink,
            }),
        })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.shared.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }

    /// Queues `player` for `game_id`, replacing any request they already
    /// have there. Starts the game's ticker if it isn't running.
    pub async fn enqueue(&self, player: RoomMember, game_id: GameId, mode: MatchMode) -> Enqueued {
        let player_id = player.id;
        let enqueued = {
            let mut state = self.shared.state.lock().await;
            let replaced = state.queue.enqueue(player, game_id.clone(), mode);
            let enqueued = Enqueued {
                replaced,
                position: state.queue.position(&game_id, player_id).unwrap_or(0),
                queue_size: state.queue.len(&game_id),
            };
            Shared::ensure_ticker(&self.shared, &mut state, &game_id);
            enqueued
        };

        tracing::info!(
            %player_id,
            %game_id,
            %mode,
            position = enqueued.position,
            queue_size = enqueued.queue_size,
            replaced = enqueued.replaced,
            "player queued"
        );
        let _ = self.shared.events.send(QueueEvent::Queued {
            player_id,
            game_id,
            mode,
            queue_size: enqueued.queue_size,
            replaced: enqueued.replaced,
        });
        enqueued
    }

    /// Cancels the player's request for `game_id`. `None` if there was none.
    ///
    /// A request whose group is being delivered right now is withdrawn
    /// from it: if that delivery fails, the request is not put back.
    pub async fn dequeue(&self, game_id: &GameId, player_id: PlayerId) -> Option<MatchRequest> {
        let removed = {
            let mut state = self.shared.state.lock().await;
            match state.queue.dequeue(game_id, player_id) {
                Some(request) => request,
                None => state.withdraw(game_id, player_id)?,
            }
        };
        tracing::info!(%player_id, %game_id, "player left queue");
        let _ = self.shared.events.send(QueueEvent::Dequeued {
            player_id,
            game_id: game_id.clone(),
        });
        Some(removed)
    }

    /// Cancels every request the player has, in any game.
    pub async fn dequeue_everywhere(&self, player_id: PlayerId) -> Vec<MatchRequest> {
        let removed = {
            let mut state = self.shared.state.lock().await;
            let mut removed = state.queue.dequeue_everywhere(player_id);
            removed.extend(state.withdraw_everywhere(player_id));
            removed.sort_by(|a, b| a.game_id.cmp(&b.game_id));
            removed
        };
        for request in &removed {
            tracing::info!(%player_id, game_id = %request.game_id, "player left queue");
            let _ = self.shared.events.send(QueueEvent::Dequeued {
                player_id,
                game_id: request.game_id.clone(),
            });
        }
        removed
    }

    /// Runs one match attempt for `game_id` right away instead of waiting
    /// for its ticker. Returns `true` if a group was formed.
    pub async fn match_now(&self, game_id: &GameId) -> bool {
        Shared::attempt(&self.shared, game_id).await
    }

    pub async fn queue_info(&self, game_id: &GameId) -> QueueInfo {
        self.shared.state.lock().await.queue.queue_info(game_id)
    }

    pub async fn all_queue_info(&self) -> Vec<QueueInfo> {
        self.shared.state.lock().await.queue.all_queue_info()
    }

    pub async fn position(&self, game_id: &GameId, player_id: PlayerId) -> Option<usize> {
        self.shared.state.lock().await.queue.position(game_id, player_id)
    }

    pub async fn is_queued(&self, game_id: &GameId, player_id: PlayerId) -> bool {
        self.shared.state.lock().await.queue.is_queued(game_id, player_id)
    }

    /// Games whose ticker is currently running, sorted.
    pub async fn active_tickers(&self) -> Vec<GameId> {
        let mut games: Vec<GameId> = self.shared.state.lock().await.tickers.keys().cloned().collect();
        games.sort();
        games
    }

    /// Stops every ticker. Queued requests stay queued but nothing will
    /// match them until the next enqueue restarts their game's ticker.
    pub async fn shutdown(&self) {
        let mut state = self.shared.state.lock().await;
        for (game_id, ticker) in state.tickers.drain() {
            ticker.abort();
            tracing::debug!(%game_id, "match ticker aborted");
        }
        tracing::info!("matchmaker shut down");
    }
}

impl<S: MatchSink> Shared<S> {
    /// Spawns the game's ticker unless one is running or the line is empty.
    /// Caller holds the state lock.
    fn ensure_ticker(this: &Arc<Self>, state: &mut State, game_id: &GameId) {
        if state.tickers.contains_key(game_id) || state.queue.is_empty(game_id) {
            return;
        }
        let handle = tokio::spawn(Self::run_ticker(Arc::clone(this), game_id.clone()));
        state.tickers.insert(game_id.clone(), handle);
        tracing::debug!(%game_id, "match ticker started");
    }

    async fn run_ticker(this: Arc<Self>, game_id: GameId) {
        let mut ticker = MatchTicker::new(this.config.tick_interval, this.config.initial_jitter);
        loop {
            let tick = ticker.tick().await;
            {
                let mut state = this.state.lock().await;
                if state.queue.is_empty(&game_id) {
                    state.tickers.remove(&game_id);
                    tracing::debug!(%game_id, tick, "match ticker stopped");
                    return;
                }
            }
            Self::attempt(&this, &game_id).await;
        }
    }

    /// One match attempt: take a group under the lock, deliver it without.
    async fn attempt(this: &Arc<Self>, game_id: &GameId) -> bool {
        let taken = {
            let mut state = this.state.lock().await;
            let requests = state
                .queue
                .try_match(game_id, this.config.group_size, this.config.max_wait);
            requests.map(|requests| {
                let delivery = state.next_delivery;
                state.next_delivery += 1;
                state.delivering.insert(delivery, requests.clone());
                (delivery, requests)
            })
        };
        let Some((delivery, requests)) = taken else {
            return false;
        };

        let group = MatchGroup {
            game_id: game_id.clone(),
            mode: requests[0].mode,
            requests,
        };
        let players = group.player_ids();
        tracing::info!(%game_id, mode = %group.mode, ?players, "players matched");
        let _ = this.events.send(QueueEvent::Matched {
            game_id: game_id.clone(),
            mode: group.mode,
            players,
        });

        let result = this.sink.matched(group).await;
        let mut cancelled = Vec::new();
        {
            let mut state = this.state.lock().await;
            let remaining = state.delivering.remove(&delivery).unwrap_or_default();
            match result {
                Ok(()) => {
                    // Matched players stop waiting in other games' lines.
                    for request in &remaining {
                        let player_id = request.player_id();
                        cancelled.extend(state.queue.dequeue_everywhere(player_id));
                        cancelled.extend(state.withdraw_everywhere(player_id));
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        %game_id,
                        %error,
                        requeued = remaining.len(),
                        "match delivery failed, requeueing group"
                    );
                    state.queue.restore(remaining);
                    Self::ensure_ticker(this, &mut state, game_id);
                }
            }
        }
        for request in cancelled {
            tracing::debug!(
                player_id = %request.player_id(),
                game_id = %request.game_id,
                "matched player left other queue"
            );
            let _ = this.events.send(QueueEvent::Dequeued {
                player_id: request.player_id(),
                game_id: request.game_id,
            });
        }
        true
    }
}
