//! Delivery of presence directives.
//!
//! [`Transport`] is the narrow contract a real-time transport fulfils:
//! deliver bytes to a topic's members, and manage topic membership.
//! [`Dispatcher`] turns [`Directive`]s into transport calls, encoding
//! each event once with a [`Codec`]. Delivery failures are logged and
//! counted, never returned: a committed room change stands whether or
//! not anyone heard about it.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use gamehall_protocol::{Codec, Envelope, JsonCodec, LobbyEvent, PlayerId, Topic, unix_millis};
use tokio::sync::Mutex;

use crate::{Directive, PresenceError};

/// A real-time channel to clients, addressed by topic.
pub trait Transport: Send + Sync + 'static {
    /// Delivers `payload` to every current member of `topic`.
    fn emit(
        &self,
        topic: &Topic,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), PresenceError>> + Send;

    fn subscribe(
        &self,
        player: PlayerId,
        topic: &Topic,
    ) -> impl Future<Output = Result<(), PresenceError>> + Send;

    fn unsubscribe(
        &self,
        player: PlayerId,
        topic: &Topic,
    ) -> impl Future<Output = Result<(), PresenceError>> + Send;
}

/// Counters for one [`Dispatcher::apply`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Successful topic deliveries.
    pub emitted: usize,
    /// Successful subscribe or unsubscribe calls.
    pub membership: usize,
    /// Transport calls that failed, plus events that failed to encode.
    pub failed: usize,
}

/// Applies directives through a [`Transport`].
pub struct Dispatcher<T, C = JsonCodec> {
    transport: T,
    codec: C,
    seq: AtomicU64,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self::with_codec(transport, JsonCodec)
    }
}

impl<T: Transport, C: Codec> Dispatcher<T, C> {
    pub fn with_codec(transport: T, codec: C) -> Self {
        Self {
            transport,
            codec,
            seq: AtomicU64::new(0),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Applies `directives` in order.
    pub async fn apply(&self, directives: Vec<Directive>) -> DispatchStats {
        let mut stats = DispatchStats::default();
        for directive in directives {
            match directive {
                Directive::Emit { topics, event } => {
                    self.emit(&topics, event, &mut stats).await;
                }
                Directive::Subscribe { player, topic } => {
                    match self.transport.subscribe(player, &topic).await {
                        Ok(()) => stats.membership += 1,
                        Err(error) => {
                            stats.failed += 1;
                            tracing::warn!(%player, %topic, %error, "subscribe failed");
                        }
                    }
                }
                Directive::Unsubscribe { player, topic } => {
                    match self.transport.unsubscribe(player, &topic).await {
                        Ok(()) => stats.membership += 1,
                        Err(error) => {
                            stats.failed += 1;
                            tracing::warn!(%player, %topic, %error, "unsubscribe failed");
                        }
                    }
                }
            }
        }
        stats
    }

    async fn emit(&self, topics: &[Topic], event: LobbyEvent, stats: &mut DispatchStats) {
        let name = event.name();
        let envelope = Envelope {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: unix_millis(),
            event,
        };
        let payload = match self.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(error) => {
                stats.failed += 1;
                tracing::warn!(event = name, %error, "failed to encode presence event");
                return;
            }
        };
        for topic in topics {
            match self.transport.emit(topic, &payload).await {
                Ok(()) => {
                    stats.emitted += 1;
                    tracing::trace!(%topic, event = name, bytes = payload.len(), "event emitted");
                }
                Err(error) => {
                    stats.failed += 1;
                    tracing::warn!(%topic, event = name, %error, "event delivery failed");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

/// An in-process [`Transport`] that fans payloads out to per-player
/// inboxes. Used by tests and the demo.
///
/// A player in several of one envelope's topics receives it once, the
/// way a broadcast to a union of rooms behaves on a socket server.
/// Envelopes carry a sequence number, so equal payloads are the same
/// envelope.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    members: HashMap<Topic, BTreeSet<PlayerId>>,
    inboxes: HashMap<PlayerId, Vec<Vec<u8>>>,
    emitted: Vec<(Topic, Vec<u8>)>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current members of `topic`, sorted.
    pub async fn members(&self, topic: &Topic) -> Vec<PlayerId> {
        self.state
            .lock()
            .await
            .members
            .get(topic)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drains the payloads delivered to `player` so far.
    pub async fn take_inbox(&self, player: PlayerId) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .await
            .inboxes
            .remove(&player)
            .unwrap_or_default()
    }

    /// Every emit so far, in order, with the topic it was addressed to.
    pub async fn emitted(&self) -> Vec<(Topic, Vec<u8>)> {
        self.state.lock().await.emitted.clone()
    }
}

impl Transport for MemoryTransport {
    async fn emit(&self, topic: &Topic, payload: &[u8]) -> Result<(), PresenceError> {
        let mut state = self.state.lock().await;
        let recipients: Vec<PlayerId> = match topic {
            Topic::Player(player) => vec![*player],
            _ => state
                .members
                .get(topic)
                .map(|m| m.iter().copied().collect())
                .unwrap_or_default(),
        };
        for player in recipients {
            let inbox = state.inboxes.entry(player).or_default();
            if inbox.last().map(Vec::as_slice) != Some(payload) {
                inbox.push(payload.to_vec());
            }
        }
        state.emitted.push((topic.clone(), payload.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, player: PlayerId, topic: &Topic) -> Result<(), PresenceError> {
        self.state
            .lock()
            .await
            .members
            .entry(topic.clone())
            .or_default()
            .insert(player);
        Ok(())
    }

    async fn unsubscribe(&self, player: PlayerId, topic: &Topic) -> Result<(), PresenceError> {
        let mut state = self.state.lock().await;
        if let Some(members) = state.members.get_mut(topic) {
            members.remove(&player);
            if members.is_empty() {
                state.members.remove(topic);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use gamehall_protocol::{GameId, RoomId};

    use super::*;

    /// Refuses every emit to the lobby topic.
    #[derive(Default)]
    struct PickyTransport {
        inner: MemoryTransport,
    }

    impl Transport for PickyTransport {
        async fn emit(&self, topic: &Topic, payload: &[u8]) -> Result<(), PresenceError> {
            if *topic == Topic::Lobby {
                return Err(PresenceError::Transport("lobby offline".into()));
            }
            self.inner.emit(topic, payload).await
        }

        async fn subscribe(&self, player: PlayerId, topic: &Topic) -> Result<(), PresenceError> {
            self.inner.subscribe(player, topic).await
        }

        async fn unsubscribe(&self, player: PlayerId, topic: &Topic) -> Result<(), PresenceError> {
            self.inner.unsubscribe(player, topic).await
        }
    }

    fn decode(bytes: &[u8]) -> Envelope {
        JsonCodec.decode(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_apply_fans_out_to_topic_members() {
        let dispatcher = Dispatcher::new(MemoryTransport::new());
        let room = Topic::Room(RoomId(1));
        let stats = dispatcher
            .apply(vec![
                Directive::Subscribe { player: PlayerId(1), topic: room.clone() },
                Directive::Subscribe { player: PlayerId(2), topic: room.clone() },
                Directive::Emit {
                    topics: vec![room.clone()],
                    event: LobbyEvent::QueueLeft { game_id: GameId::from("g1") },
                },
            ])
            .await;

        assert_eq!(stats, DispatchStats { emitted: 1, membership: 2, failed: 0 });
        let transport = dispatcher.transport();
        assert_eq!(transport.members(&room).await, vec![PlayerId(1), PlayerId(2)]);
        for player in [PlayerId(1), PlayerId(2)] {
            let inbox = transport.take_inbox(player).await;
            assert_eq!(inbox.len(), 1);
            assert_eq!(decode(&inbox[0]).event.name(), "queue_left");
        }
    }

    #[tokio::test]
    async fn test_apply_numbers_envelopes_in_order() {
        let dispatcher = Dispatcher::new(MemoryTransport::new());
        let me = Topic::Player(PlayerId(9));
        let event = LobbyEvent::QueueLeft { game_id: GameId::from("g1") };
        dispatcher
            .apply(vec![
                Directive::Emit { topics: vec![me.clone()], event: event.clone() },
                Directive::Emit { topics: vec![me.clone()], event },
            ])
            .await;

        let seqs: Vec<u64> = dispatcher
            .transport()
            .take_inbox(PlayerId(9))
            .await
            .iter()
            .map(|b| decode(b).seq)
            .collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_apply_counts_failures_and_keeps_going() {
        let dispatcher = Dispatcher::new(PickyTransport::default());
        let stats = dispatcher
            .apply(vec![
                Directive::Emit {
                    topics: vec![Topic::Lobby, Topic::Player(PlayerId(1))],
                    event: LobbyEvent::ConnectionChanged {
                        player_id: PlayerId(1),
                        online: true,
                        timestamp: 0,
                    },
                },
            ])
            .await;

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.emitted, 1);
        assert_eq!(dispatcher.transport().inner.take_inbox(PlayerId(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let transport = MemoryTransport::new();
        let room = Topic::Room(RoomId(3));
        transport.subscribe(PlayerId(1), &room).await.unwrap();
        transport.unsubscribe(PlayerId(1), &room).await.unwrap();
        transport.emit(&room, b"{}").await.unwrap();

        assert!(transport.members(&room).await.is_empty());
        assert!(transport.take_inbox(PlayerId(1)).await.is_empty());
        assert_eq!(transport.emitted().await.len(), 1);
    }
}
