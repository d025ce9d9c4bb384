//! Integration tests for the matchmaking service, on a paused clock.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use gamehall_protocol::{ErrorKind, GameId, MatchMode, PlayerId, RoomMember, UserId};
use gamehall_matchmaking::{
    GroupPolicy, MatchConfig, MatchError, MatchGroup, MatchSink, Matchmaker, QueueEvent,
};
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

fn member(id: u64) -> RoomMember {
    RoomMember {
        id: PlayerId(id),
        user_id: UserId(id),
        display_name: format!("p{id}"),
        level: 3,
    }
}

fn g1() -> GameId {
    GameId::from("g1")
}

fn config() -> MatchConfig {
    MatchConfig {
        initial_jitter: Duration::ZERO,
        ..MatchConfig::default()
    }
}

/// Forwards every group to a channel.
struct ChannelSink {
    tx: mpsc::UnboundedSender<MatchGroup>,
}

impl MatchSink for ChannelSink {
    async fn matched(&self, group: MatchGroup) -> Result<(), MatchError> {
        let _ = self.tx.send(group);
        Ok(())
    }
}

/// Fails the first `failures` deliveries, then forwards.
struct FlakySink {
    failures: AtomicUsize,
    tx: mpsc::UnboundedSender<MatchGroup>,
}

impl MatchSink for FlakySink {
    async fn matched(&self, group: MatchGroup) -> Result<(), MatchError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(MatchError::Delivery {
                kind: ErrorKind::Persistence,
                reason: "store down".into(),
            });
        }
        let _ = self.tx.send(group);
        Ok(())
    }
}

/// Reports when a delivery starts, then fails it once released.
struct HeldSink {
    started: mpsc::UnboundedSender<Vec<u64>>,
    release: Arc<Notify>,
}

impl MatchSink for HeldSink {
    async fn matched(&self, group: MatchGroup) -> Result<(), MatchError> {
        let _ = self.started.send(ids(&group));
        self.release.notified().await;
        Err(MatchError::Delivery {
            kind: ErrorKind::Persistence,
            reason: "store down".into(),
        })
    }
}

fn matchmaker(config: MatchConfig) -> (Matchmaker<ChannelSink>, mpsc::UnboundedReceiver<MatchGroup>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Matchmaker::new(config, ChannelSink { tx }).unwrap(), rx)
}

fn ids(group: &MatchGroup) -> Vec<u64> {
    group.player_ids().into_iter().map(|p| p.0).collect()
}

// =========================================================================
// Ticker-driven matching
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_two_casual_requests_matched_in_fifo_order() {
    let (mm, mut rx) = matchmaker(config());
    let start = Instant::now();

    mm.enqueue(member(1), g1(), MatchMode::Casual).await;
    mm.enqueue(member(2), g1(), MatchMode::Casual).await;
    assert_eq!(mm.active_tickers().await, vec![g1()]);

    let group = rx.recv().await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_secs(1));
    assert_eq!(ids(&group), vec![1, 2]);
    assert_eq!(group.mode, MatchMode::Casual);
    assert_eq!(mm.queue_info(&g1()).await.queue_size, 0);
}

#[tokio::test(start_paused = true)]
async fn test_ticker_stops_once_queue_drains() {
    let (mm, mut rx) = matchmaker(config());
    mm.enqueue(member(1), g1(), MatchMode::Ranked).await;
    mm.enqueue(member(2), g1(), MatchMode::Ranked).await;
    rx.recv().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(mm.active_tickers().await.is_empty());

    mm.enqueue(member(3), g1(), MatchMode::Ranked).await;
    assert_eq!(mm.active_tickers().await, vec![g1()]);
}

#[tokio::test(start_paused = true)]
async fn test_ticker_stops_after_dequeue() {
    let (mm, _rx) = matchmaker(config());
    mm.enqueue(member(1), g1(), MatchMode::Casual).await;

    let removed = mm.dequeue(&g1(), PlayerId(1)).await.unwrap();
    assert_eq!(removed.player_id(), PlayerId(1));
    assert!(mm.dequeue(&g1(), PlayerId(1)).await.is_none());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(mm.active_tickers().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_strict_lone_request_keeps_waiting() {
    let (mm, mut rx) = matchmaker(config());
    mm.enqueue(member(1), g1(), MatchMode::Casual).await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(rx.try_recv().is_err());
    assert!(mm.is_queued(&g1(), PlayerId(1)).await);
    assert_eq!(mm.active_tickers().await, vec![g1()]);

    let info = mm.queue_info(&g1()).await;
    assert_eq!(info.queue_size, 1);
    assert_eq!(info.longest_wait, Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn test_lenient_matches_short_group_after_max_wait() {
    let (mm, mut rx) = matchmaker(MatchConfig {
        group_size: 4,
        max_wait: Duration::from_secs(5),
        group: GroupPolicy::Lenient,
        ..config()
    });
    let start = Instant::now();
    mm.enqueue(member(1), g1(), MatchMode::Team).await;
    mm.enqueue(member(2), g1(), MatchMode::Team).await;

    let group = rx.recv().await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert_eq!(ids(&group), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_games_have_independent_tickers() {
    let (mm, mut rx) = matchmaker(config());
    let g2 = GameId::from("g2");
    mm.enqueue(member(1), g1(), MatchMode::Casual).await;
    mm.enqueue(member(2), g2.clone(), MatchMode::Casual).await;
    mm.enqueue(member(3), g2.clone(), MatchMode::Casual).await;
    assert_eq!(mm.active_tickers().await, vec![g1(), g2.clone()]);

    let group = rx.recv().await.unwrap();
    assert_eq!(group.game_id, g2);
    assert!(mm.is_queued(&g1(), PlayerId(1)).await);
}

// =========================================================================
// Delivery failures
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_delivery_requeues_group_in_place() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = FlakySink {
        failures: AtomicUsize::new(1),
        tx,
    };
    let mm = Matchmaker::new(config(), sink).unwrap();
    let start = Instant::now();

    mm.enqueue(member(1), g1(), MatchMode::Casual).await;
    mm.enqueue(member(2), g1(), MatchMode::Casual).await;

    let group = rx.recv().await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_secs(2), "second tick retries");
    assert_eq!(ids(&group), vec![1, 2]);
}

#[tokio::test]
async fn test_cancel_during_delivery_survives_failed_delivery() {
    let (started, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let sink = HeldSink {
        started,
        release: Arc::clone(&release),
    };
    let mm = Matchmaker::new(
        MatchConfig {
            tick_interval: Duration::from_secs(3600),
            ..config()
        },
        sink,
    )
    .unwrap();
    mm.enqueue(member(1), g1(), MatchMode::Casual).await;
    mm.enqueue(member(2), g1(), MatchMode::Casual).await;

    let attempt = tokio::spawn({
        let mm = mm.clone();
        async move { mm.match_now(&GameId::from("g1")).await }
    });
    assert_eq!(started_rx.recv().await.unwrap(), vec![1, 2]);

    let cancelled = mm.dequeue(&g1(), PlayerId(1)).await;
    assert_eq!(cancelled.map(|r| r.player_id()), Some(PlayerId(1)));
    assert!(mm.dequeue(&g1(), PlayerId(1)).await.is_none());

    release.notify_one();
    assert!(attempt.await.unwrap());
    assert!(!mm.is_queued(&g1(), PlayerId(1)).await);
    assert!(mm.is_queued(&g1(), PlayerId(2)).await);
    assert_eq!(mm.queue_info(&g1()).await.queue_size, 1);
}

#[tokio::test]
async fn test_dequeue_everywhere_withdraws_delivering_request() {
    let (started, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let mm = Matchmaker::new(
        MatchConfig {
            tick_interval: Duration::from_secs(3600),
            ..config()
        },
        HeldSink {
            started,
            release: Arc::clone(&release),
        },
    )
    .unwrap();
    mm.enqueue(member(1), g1(), MatchMode::Casual).await;
    mm.enqueue(member(2), g1(), MatchMode::Casual).await;
    mm.enqueue(member(2), GameId::from("g2"), MatchMode::Casual).await;

    let attempt = tokio::spawn({
        let mm = mm.clone();
        async move { mm.match_now(&GameId::from("g1")).await }
    });
    started_rx.recv().await.unwrap();

    let removed = mm.dequeue_everywhere(PlayerId(2)).await;
    let games: Vec<_> = removed.iter().map(|r| r.game_id.clone()).collect();
    assert_eq!(games, vec![g1(), GameId::from("g2")]);

    release.notify_one();
    attempt.await.unwrap();
    assert_eq!(mm.position(&g1(), PlayerId(1)).await, Some(1));
    assert!(!mm.is_queued(&g1(), PlayerId(2)).await);
}

// =========================================================================
// Events and positions
// =========================================================================

#[tokio::test]
async fn test_queue_events_and_positions() {
    let (mm, _rx) = matchmaker(MatchConfig {
        tick_interval: Duration::from_secs(3600),
        ..config()
    });
    let mut events = mm.subscribe();

    let first = mm.enqueue(member(1), g1(), MatchMode::Casual).await;
    assert_eq!((first.position, first.queue_size, first.replaced), (1, 1, false));
    let second = mm.enqueue(member(2), g1(), MatchMode::Casual).await;
    assert_eq!(second.position, 2);
    let again = mm.enqueue(member(1), g1(), MatchMode::Ranked).await;
    assert!(again.replaced);
    assert_eq!(again.position, 1, "re-enqueue keeps the original place");

    assert!(matches!(
        events.try_recv(),
        Ok(QueueEvent::Queued { queue_size: 1, replaced: false, .. })
    ));
    assert!(matches!(events.try_recv(), Ok(QueueEvent::Queued { queue_size: 2, .. })));
    assert!(matches!(
        events.try_recv(),
        Ok(QueueEvent::Queued { mode: MatchMode::Ranked, replaced: true, .. })
    ));

    mm.dequeue(&g1(), PlayerId(2)).await;
    assert!(matches!(
        events.try_recv(),
        Ok(QueueEvent::Dequeued { player_id: PlayerId(2), .. })
    ));
    assert_eq!(mm.position(&g1(), PlayerId(1)).await, Some(1));
}

#[tokio::test]
async fn test_match_now_publishes_matched_event() {
    let (mm, mut rx) = matchmaker(MatchConfig {
        tick_interval: Duration::from_secs(3600),
        ..config()
    });
    let mut events = mm.subscribe();
    mm.enqueue(member(5), g1(), MatchMode::Ranked).await;
    assert!(!mm.match_now(&g1()).await);
    mm.enqueue(member(6), g1(), MatchMode::Ranked).await;
    assert!(mm.match_now(&g1()).await);

    assert_eq!(ids(&rx.recv().await.unwrap()), vec![5, 6]);
    let matched = std::iter::from_fn(|| events.try_recv().ok())
        .find(|e| matches!(e, QueueEvent::Matched { .. }))
        .unwrap();
    assert_eq!(
        matched,
        QueueEvent::Matched {
            game_id: g1(),
            mode: MatchMode::Ranked,
            players: vec![PlayerId(5), PlayerId(6)],
        }
    );
}

#[tokio::test]
async fn test_matched_player_leaves_other_queues() {
    let (mm, mut rx) = matchmaker(MatchConfig {
        tick_interval: Duration::from_secs(3600),
        ..config()
    });
    let g2 = GameId::from("g2");
    mm.enqueue(member(1), g1(), MatchMode::Casual).await;
    mm.enqueue(member(1), g2.clone(), MatchMode::Casual).await;
    mm.enqueue(member(3), g2.clone(), MatchMode::Casual).await;
    mm.enqueue(member(2), g1(), MatchMode::Casual).await;
    let mut events = mm.subscribe();

    assert!(mm.match_now(&g1()).await);
    assert_eq!(ids(&rx.recv().await.unwrap()), vec![1, 2]);
    assert!(!mm.is_queued(&g2, PlayerId(1)).await);
    assert_eq!(mm.position(&g2, PlayerId(3)).await, Some(1));

    let dequeued: Vec<QueueEvent> = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, QueueEvent::Dequeued { .. }))
        .collect();
    assert_eq!(
        dequeued,
        vec![QueueEvent::Dequeued {
            player_id: PlayerId(1),
            game_id: g2,
        }]
    );
}

#[tokio::test]
async fn test_dequeue_everywhere_clears_all_games() {
    let (mm, _rx) = matchmaker(config());
    mm.enqueue(member(1), g1(), MatchMode::Casual).await;
    mm.enqueue(member(1), GameId::from("g2"), MatchMode::Casual).await;

    let removed = mm.dequeue_everywhere(PlayerId(1)).await;
    assert_eq!(removed.len(), 2);
    assert!(mm.all_queue_info().await.is_empty());
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_matching_never_overlaps() {
    let (mm, mut rx) = matchmaker(MatchConfig {
        tick_interval: Duration::from_secs(3600),
        ..config()
    });
    for id in 1..=20 {
        mm.enqueue(member(id), g1(), MatchMode::Casual).await;
    }

    let attempts: Vec<_> = (0..16)
        .map(|_| {
            let mm = mm.clone();
            tokio::spawn(async move { mm.match_now(&GameId::from("g1")).await })
        })
        .collect();
    let formed = join_all(attempts)
        .await
        .into_iter()
        .filter(|r| *r.as_ref().unwrap())
        .count();
    assert_eq!(formed, 10);

    let mut seen = HashSet::new();
    for _ in 0..10 {
        let group = rx.recv().await.unwrap();
        assert_eq!(group.requests.len(), 2);
        for player in group.player_ids() {
            assert!(seen.insert(player), "{player} matched twice");
        }
    }
    assert_eq!(seen.len(), 20);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_tickers() {
    let (mm, mut rx) = matchmaker(config());
    mm.enqueue(member(1), g1(), MatchMode::Casual).await;
    mm.enqueue(member(2), g1(), MatchMode::Casual).await;
    mm.shutdown().await;
    assert!(mm.active_tickers().await.is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(mm.queue_info(&g1()).await.queue_size, 2);
}

#[test]
fn test_new_rejects_invalid_config() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let result = Matchmaker::new(
        MatchConfig {
            group_size: 0,
            ..MatchConfig::default()
        },
        ChannelSink { tx },
    );
    assert!(matches!(result, Err(MatchError::InvalidConfig(_))));
}
