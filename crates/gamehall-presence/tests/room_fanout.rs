//! Room registry events flowing through the broadcaster into an
//! in-memory transport.

use gamehall_presence::{Dispatcher, MemoryTransport, PresenceBroadcaster};
use gamehall_protocol::{
    Capacity, Codec, Envelope, GameId, JsonCodec, PlayerId, RoomMember, Topic, UserId,
};
use gamehall_room::{CloseRequester, NewRoom, RegistryConfig, RoomEvent, RoomRegistry};
use tokio::sync::broadcast;

fn member(id: u64) -> RoomMember {
    RoomMember {
        id: PlayerId(id),
        user_id: UserId(id),
        display_name: format!("p{id}"),
        level: 1,
    }
}

/// Applies every event currently buffered on `events`.
async fn pump(events: &mut broadcast::Receiver<RoomEvent>, dispatcher: &Dispatcher<MemoryTransport>) {
    while let Ok(event) = events.try_recv() {
        dispatcher.apply(PresenceBroadcaster::room_event(&event)).await;
    }
}

async fn inbox(dispatcher: &Dispatcher<MemoryTransport>, player: u64) -> Vec<&'static str> {
    dispatcher
        .transport()
        .take_inbox(PlayerId(player))
        .await
        .iter()
        .map(|bytes| {
            let envelope: Envelope = JsonCodec.decode(bytes).unwrap();
            envelope.event.name()
        })
        .collect()
}

#[tokio::test]
async fn test_room_lifecycle_reaches_the_right_players() {
    let registry = RoomRegistry::new(RegistryConfig::default());
    let mut events = registry.subscribe();
    let dispatcher = Dispatcher::new(MemoryTransport::new());
    let g1 = GameId::from("g1");

    let room = registry
        .create_room(NewRoom::new(g1.clone(), "duel", member(1), Capacity { min: 2, max: 4 }))
        .await
        .unwrap();
    registry.join_room(room.id, member(2), None).await.unwrap();
    registry.join_room(room.id, member(3), None).await.unwrap();
    pump(&mut events, &dispatcher).await;

    let room_topic = Topic::Room(room.id);
    assert_eq!(
        dispatcher.transport().members(&room_topic).await,
        vec![PlayerId(1), PlayerId(2), PlayerId(3)]
    );
    // The creator hears the listing and both joins; player 3 only hears
    // their own join.
    assert_eq!(
        inbox(&dispatcher, 1).await,
        vec!["room_created", "player_joined", "player_joined"]
    );
    assert_eq!(inbox(&dispatcher, 3).await, vec!["player_joined"]);

    registry.leave_room(room.id, PlayerId(1)).await;
    pump(&mut events, &dispatcher).await;
    assert!(inbox(&dispatcher, 1).await.is_empty(), "leaver is unsubscribed first");
    assert_eq!(
        inbox(&dispatcher, 2).await,
        vec!["player_left", "ownership_transferred"]
    );
    assert_eq!(inbox(&dispatcher, 3).await, vec!["player_left"]);

    registry
        .close_room(room.id, CloseRequester::Player(PlayerId(2)))
        .await
        .unwrap();
    pump(&mut events, &dispatcher).await;
    assert_eq!(inbox(&dispatcher, 3).await, vec!["room_destroyed"]);
    assert!(dispatcher.transport().members(&room_topic).await.is_empty());
    assert!(dispatcher.transport().members(&Topic::Game(g1)).await.is_empty());
}
