//! Maps domain events to addressed presence directives.
//!
//! Nothing here performs I/O. The broadcaster decides who hears about a
//! change and which channels a player joins or leaves; the
//! [`Dispatcher`](crate::Dispatcher) carries the directives out.

use gamehall_matchmaking::QueueEvent;
use gamehall_protocol::{LobbyEvent, PlayerId, RoomId, Topic};
use gamehall_room::{RoomEvent, RoomOrigin, RoomSnapshot};

/// One addressed instruction for the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Deliver `event` to every member of each topic.
    Emit { topics: Vec<Topic>, event: LobbyEvent },
    /// Add the player to a topic.
    Subscribe { player: PlayerId, topic: Topic },
    /// Remove the player from a topic.
    Unsubscribe { player: PlayerId, topic: Topic },
}

impl Directive {
    fn emit(topics: Vec<Topic>, event: LobbyEvent) -> Self {
        Self::Emit { topics, event }
    }

    fn subscribe(player: PlayerId, topic: Topic) -> Self {
        Self::Subscribe { player, topic }
    }

    fn unsubscribe(player: PlayerId, topic: Topic) -> Self {
        Self::Unsubscribe { player, topic }
    }
}

/// Stateless event-to-directive mapping.
///
/// Membership changes that let a player hear an event come before the
/// emit; membership changes that cut a player off come after it when
/// the player should still hear the event (a closing room), and before
/// it otherwise (a voluntary leave).
///
/// A player follows a game's listing only while seated in one of its
/// rooms, so leaving, being kicked, or the room finishing drops both
/// the room and the game topic.
pub struct PresenceBroadcaster;

impl PresenceBroadcaster {
    pub fn room_event(event: &RoomEvent) -> Vec<Directive> {
        match event {
            RoomEvent::Created { room } => Self::room_created(room),

            RoomEvent::PlayerJoined {
                room_id,
                game_id,
                member,
                player_count,
            } => vec![
                Directive::subscribe(member.id, Topic::Room(*room_id)),
                Directive::subscribe(member.id, Topic::Game(game_id.clone())),
                Directive::emit(
                    vec![Topic::Room(*room_id)],
                    LobbyEvent::PlayerJoined {
                        room_id: *room_id,
                        player: member.clone(),
                        player_count: *player_count,
                    },
                ),
            ],

            RoomEvent::PlayerLeft {
                room_id,
                game_id,
                player_id,
                new_owner,
                player_count,
            } => {
                let mut directives = vec![
                    Directive::unsubscribe(*player_id, Topic::Room(*room_id)),
                    Directive::unsubscribe(*player_id, Topic::Game(game_id.clone())),
                    Directive::emit(
                        vec![Topic::Room(*room_id)],
                        LobbyEvent::PlayerLeft {
                            room_id: *room_id,
                            player_id: *player_id,
                            new_owner: *new_owner,
                            player_count: *player_count,
                        },
                    ),
                ];
                if let Some(owner) = new_owner {
                    directives.push(Directive::emit(
                        vec![Topic::Player(*owner)],
                        LobbyEvent::OwnershipTransferred {
                            room_id: *room_id,
                            new_owner: *owner,
                        },
                    ));
                }
                directives
            }

            RoomEvent::PlayerKicked {
                room_id,
                game_id,
                player_id,
                ..
            } => vec![
                Directive::unsubscribe(*player_id, Topic::Room(*room_id)),
                Directive::unsubscribe(*player_id, Topic::Game(game_id.clone())),
                Directive::emit(
                    vec![Topic::Room(*room_id), Topic::Player(*player_id)],
                    LobbyEvent::PlayerKicked {
                        room_id: *room_id,
                        player_id: *player_id,
                    },
                ),
            ],

            RoomEvent::GameStarted {
                room_id,
                game_id,
                player_count,
                started_at,
            } => vec![Directive::emit(
                vec![Topic::Room(*room_id), Topic::Game(game_id.clone())],
                LobbyEvent::GameStarted {
                    room_id: *room_id,
                    player_count: *player_count,
                    started_at: *started_at,
                },
            )],

            RoomEvent::SettingsUpdated { room_id, settings } => vec![Directive::emit(
                vec![Topic::Room(*room_id)],
                LobbyEvent::SettingsUpdated {
                    room_id: *room_id,
                    settings: settings.clone(),
                },
            )],

            RoomEvent::Destroyed {
                room_id,
                game_id,
                members,
                ..
            } => {
                let mut directives = vec![Directive::emit(
                    vec![Topic::Room(*room_id), Topic::Game(game_id.clone())],
                    LobbyEvent::RoomDestroyed {
                        room_id: *room_id,
                        game_id: game_id.clone(),
                    },
                )];
                for player in members {
                    directives.push(Directive::unsubscribe(*player, Topic::Room(*room_id)));
                    directives.push(Directive::unsubscribe(*player, Topic::Game(game_id.clone())));
                }
                directives
            }

            RoomEvent::ReadyChanged {
                room_id,
                player_id,
                ready,
                room_ready,
            } => vec![Directive::emit(
                vec![Topic::Room(*room_id)],
                LobbyEvent::RoomReady {
                    room_id: *room_id,
                    player_id: *player_id,
                    ready: *ready,
                    room_ready: *room_ready,
                },
            )],

            RoomEvent::Message {
                room_id,
                player_id,
                display_name,
                message,
                sent_at,
            } => vec![Directive::emit(
                vec![Topic::Room(*room_id)],
                LobbyEvent::RoomMessage {
                    room_id: *room_id,
                    player_id: *player_id,
                    player_name: display_name.clone(),
                    message: message.clone(),
                    timestamp: *sent_at,
                },
            )],
        }
    }

    /// Queue acknowledgements go to the queued player only. A match is
    /// announced once its room exists, from the room's creation event.
    pub fn queue_event(event: &QueueEvent) -> Vec<Directive> {
        match event {
            QueueEvent::Queued {
                player_id,
                game_id,
                mode,
                queue_size,
                ..
            } => vec![Directive::emit(
                vec![Topic::Player(*player_id)],
                LobbyEvent::QueueJoined {
                    game_id: game_id.clone(),
                    mode: *mode,
                    queue_size: *queue_size,
                },
            )],
            QueueEvent::Dequeued { player_id, game_id } => vec![Directive::emit(
                vec![Topic::Player(*player_id)],
                LobbyEvent::QueueLeft {
                    game_id: game_id.clone(),
                },
            )],
            QueueEvent::Matched { .. } => Vec::new(),
        }
    }

    /// Announces a player going on- or offline to the whole lobby and to
    /// their room, if they are in one.
    ///
    /// Coming online joins the lobby topic before the announcement, so
    /// the player hears it too. Going offline leaves it first; the room
    /// topic is kept through the grace period.
    pub fn connection_changed(
        player_id: PlayerId,
        online: bool,
        room: Option<RoomId>,
        timestamp: u64,
    ) -> Vec<Directive> {
        let mut topics = vec![Topic::Lobby];
        topics.extend(room.map(Topic::Room));
        let membership = if online {
            Directive::subscribe(player_id, Topic::Lobby)
        } else {
            Directive::unsubscribe(player_id, Topic::Lobby)
        };
        vec![
            membership,
            Directive::emit(
                topics,
                LobbyEvent::ConnectionChanged {
                    player_id,
                    online,
                    timestamp,
                },
            ),
        ]
    }

    fn room_created(room: &RoomSnapshot) -> Vec<Directive> {
        let mut directives = Vec::with_capacity(room.members.len() * 3 + 1);
        for member in &room.members {
            directives.push(Directive::subscribe(member.id, Topic::Room(room.id)));
            directives.push(Directive::subscribe(
                member.id,
                Topic::Game(room.game_id.clone()),
            ));
        }
        directives.push(Directive::emit(
            vec![Topic::Game(room.game_id.clone())],
            LobbyEvent::RoomCreated {
                room: room.summary(),
            },
        ));

        if let RoomOrigin::Matchmaking { mode } = room.origin {
            for member in &room.members {
                let opponents = room
                    .members
                    .iter()
                    .filter(|m| m.id != member.id)
                    .cloned()
                    .collect();
                directives.push(Directive::emit(
                    vec![Topic::Player(member.id)],
                    LobbyEvent::Matched {
                        room_id: room.id,
                        game_id: room.game_id.clone(),
                        mode,
                        opponents,
                    },
                ));
            }
        }
        directives
    }
}

#[cfg(test)]
mod tests {
    use gamehall_protocol::{Capacity, GameId, MatchMode, RoomMember, RoomStatus, UserId};
    use gamehall_room::DestroyReason;

    use super::*;

    fn member(id: u64) -> RoomMember {
        RoomMember {
            id: PlayerId(id),
            user_id: UserId(id),
            display_name: format!("p{id}"),
            level: 1,
        }
    }

    fn snapshot(members: &[u64], origin: RoomOrigin) -> RoomSnapshot {
        RoomSnapshot {
            id: RoomId(7),
            game_id: GameId::from("g1"),
            name: "room".into(),
            status: RoomStatus::Waiting,
            owner: PlayerId(members[0]),
            members: members.iter().copied().map(member).collect(),
            capacity: Capacity { min: 2, max: 4 },
            is_private: false,
            settings: serde_json::Map::new(),
            origin,
            created_at: 0,
            started_at: None,
            ready: Vec::new(),
            version: 1,
        }
    }

    fn emitted(directives: &[Directive]) -> Vec<(&[Topic], &'static str)> {
        directives
            .iter()
            .filter_map(|d| match d {
                Directive::Emit { topics, event } => Some((topics.as_slice(), event.name())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_room_created_subscribes_members_then_lists_room() {
        let directives = PresenceBroadcaster::room_event(&RoomEvent::Created {
            room: snapshot(&[1], RoomOrigin::Lobby),
        });
        assert_eq!(
            directives,
            vec![
                Directive::subscribe(PlayerId(1), Topic::Room(RoomId(7))),
                Directive::subscribe(PlayerId(1), Topic::Game(GameId::from("g1"))),
                Directive::emit(
                    vec![Topic::Game(GameId::from("g1"))],
                    LobbyEvent::RoomCreated {
                        room: snapshot(&[1], RoomOrigin::Lobby).summary(),
                    },
                ),
            ]
        );
    }

    #[test]
    fn test_matched_room_tells_each_player_their_opponents() {
        let origin = RoomOrigin::Matchmaking {
            mode: MatchMode::Ranked,
        };
        let directives = PresenceBroadcaster::room_event(&RoomEvent::Created {
            room: snapshot(&[1, 2, 3], origin),
        });

        let matched: Vec<_> = directives
            .iter()
            .filter_map(|d| match d {
                Directive::Emit {
                    topics,
                    event: LobbyEvent::Matched { opponents, mode, .. },
                } => Some((topics.clone(), *mode, opponents.iter().map(|m| m.id.0).collect::<Vec<_>>())),
                _ => None,
            })
            .collect();
        assert_eq!(
            matched,
            vec![
                (vec![Topic::Player(PlayerId(1))], MatchMode::Ranked, vec![2, 3]),
                (vec![Topic::Player(PlayerId(2))], MatchMode::Ranked, vec![1, 3]),
                (vec![Topic::Player(PlayerId(3))], MatchMode::Ranked, vec![1, 2]),
            ]
        );
        let subscribes = directives
            .iter()
            .filter(|d| matches!(d, Directive::Subscribe { .. }))
            .count();
        assert_eq!(subscribes, 6);
    }

    #[test]
    fn test_player_joined_subscribes_before_emit() {
        let directives = PresenceBroadcaster::room_event(&RoomEvent::PlayerJoined {
            room_id: RoomId(7),
            game_id: GameId::from("g1"),
            member: member(2),
            player_count: 2,
        });
        assert!(matches!(directives[0], Directive::Subscribe { player: PlayerId(2), topic: Topic::Room(RoomId(7)) }));
        assert!(matches!(directives[1], Directive::Subscribe { topic: Topic::Game(_), .. }));
        assert_eq!(emitted(&directives), vec![(&[Topic::Room(RoomId(7))][..], "player_joined")]);
    }

    #[test]
    fn test_player_left_with_new_owner_notifies_owner_privately() {
        let directives = PresenceBroadcaster::room_event(&RoomEvent::PlayerLeft {
            room_id: RoomId(7),
            game_id: GameId::from("g1"),
            player_id: PlayerId(1),
            new_owner: Some(PlayerId(2)),
            player_count: 2,
        });
        assert_eq!(
            directives[0],
            Directive::unsubscribe(PlayerId(1), Topic::Room(RoomId(7)))
        );
        assert_eq!(
            emitted(&directives),
            vec![
                (&[Topic::Room(RoomId(7))][..], "player_left"),
                (&[Topic::Player(PlayerId(2))][..], "ownership_transferred"),
            ]
        );
    }

    #[test]
    fn test_player_left_without_transfer_emits_once() {
        let directives = PresenceBroadcaster::room_event(&RoomEvent::PlayerLeft {
            room_id: RoomId(7),
            game_id: GameId::from("g1"),
            player_id: PlayerId(3),
            new_owner: None,
            player_count: 2,
        });
        assert_eq!(
            directives[..2],
            [
                Directive::unsubscribe(PlayerId(3), Topic::Room(RoomId(7))),
                Directive::unsubscribe(PlayerId(3), Topic::Game(GameId::from("g1"))),
            ]
        );
        assert_eq!(directives.len(), 3);
    }

    #[test]
    fn test_player_kicked_reaches_room_and_kicked_player() {
        let directives = PresenceBroadcaster::room_event(&RoomEvent::PlayerKicked {
            room_id: RoomId(7),
            game_id: GameId::from("g1"),
            player_id: PlayerId(3),
            player_count: 1,
        });
        assert_eq!(
            directives[0],
            Directive::unsubscribe(PlayerId(3), Topic::Room(RoomId(7)))
        );
        assert_eq!(
            directives[1],
            Directive::unsubscribe(PlayerId(3), Topic::Game(GameId::from("g1")))
        );
        assert_eq!(
            emitted(&directives),
            vec![(
                &[Topic::Room(RoomId(7)), Topic::Player(PlayerId(3))][..],
                "player_kicked"
            )]
        );
    }

    #[test]
    fn test_destroyed_emits_before_unsubscribing_members() {
        let directives = PresenceBroadcaster::room_event(&RoomEvent::Destroyed {
            room_id: RoomId(7),
            game_id: GameId::from("g1"),
            reason: DestroyReason::Closed,
            members: vec![PlayerId(1), PlayerId(2)],
        });
        assert_eq!(
            directives,
            vec![
                Directive::emit(
                    vec![Topic::Room(RoomId(7)), Topic::Game(GameId::from("g1"))],
                    LobbyEvent::RoomDestroyed {
                        room_id: RoomId(7),
                        game_id: GameId::from("g1"),
                    },
                ),
                Directive::unsubscribe(PlayerId(1), Topic::Room(RoomId(7))),
                Directive::unsubscribe(PlayerId(1), Topic::Game(GameId::from("g1"))),
                Directive::unsubscribe(PlayerId(2), Topic::Room(RoomId(7))),
                Directive::unsubscribe(PlayerId(2), Topic::Game(GameId::from("g1"))),
            ]
        );
    }

    #[test]
    fn test_game_started_reaches_room_and_game() {
        let directives = PresenceBroadcaster::room_event(&RoomEvent::GameStarted {
            room_id: RoomId(7),
            game_id: GameId::from("g1"),
            player_count: 2,
            started_at: 1_000,
        });
        assert_eq!(
            emitted(&directives),
            vec![(
                &[Topic::Room(RoomId(7)), Topic::Game(GameId::from("g1"))][..],
                "game_started"
            )]
        );
    }

    #[test]
    fn test_settings_updated_reaches_room_only() {
        let mut settings = serde_json::Map::new();
        settings.insert("map".into(), "dust".into());
        let directives = PresenceBroadcaster::room_event(&RoomEvent::SettingsUpdated {
            room_id: RoomId(7),
            settings,
        });
        assert_eq!(
            emitted(&directives),
            vec![(&[Topic::Room(RoomId(7))][..], "settings_updated")]
        );
    }

    #[test]
    fn test_ready_and_chat_reach_the_room_only() {
        let ready = PresenceBroadcaster::room_event(&RoomEvent::ReadyChanged {
            room_id: RoomId(7),
            player_id: PlayerId(2),
            ready: true,
            room_ready: true,
        });
        assert_eq!(
            ready,
            vec![Directive::emit(
                vec![Topic::Room(RoomId(7))],
                LobbyEvent::RoomReady {
                    room_id: RoomId(7),
                    player_id: PlayerId(2),
                    ready: true,
                    room_ready: true,
                },
            )]
        );

        let chat = PresenceBroadcaster::room_event(&RoomEvent::Message {
            room_id: RoomId(7),
            player_id: PlayerId(2),
            display_name: "p2".into(),
            message: "gl".into(),
            sent_at: 9,
        });
        assert_eq!(emitted(&chat), vec![(&[Topic::Room(RoomId(7))][..], "room_message")]);
    }

    #[test]
    fn test_queue_events_address_the_player() {
        let queued = PresenceBroadcaster::queue_event(&QueueEvent::Queued {
            player_id: PlayerId(4),
            game_id: GameId::from("g1"),
            mode: MatchMode::Casual,
            queue_size: 3,
            replaced: false,
        });
        assert_eq!(
            queued,
            vec![Directive::emit(
                vec![Topic::Player(PlayerId(4))],
                LobbyEvent::QueueJoined {
                    game_id: GameId::from("g1"),
                    mode: MatchMode::Casual,
                    queue_size: 3,
                },
            )]
        );

        let left = PresenceBroadcaster::queue_event(&QueueEvent::Dequeued {
            player_id: PlayerId(4),
            game_id: GameId::from("g1"),
        });
        assert_eq!(emitted(&left), vec![(&[Topic::Player(PlayerId(4))][..], "queue_left")]);

        let matched = PresenceBroadcaster::queue_event(&QueueEvent::Matched {
            game_id: GameId::from("g1"),
            mode: MatchMode::Casual,
            players: vec![PlayerId(4), PlayerId(5)],
        });
        assert!(matched.is_empty());
    }

    #[test]
    fn test_connection_changed_topics() {
        let in_room = PresenceBroadcaster::connection_changed(PlayerId(1), false, Some(RoomId(7)), 5);
        assert_eq!(
            emitted(&in_room),
            vec![(&[Topic::Lobby, Topic::Room(RoomId(7))][..], "connection_changed")]
        );

        let idle = PresenceBroadcaster::connection_changed(PlayerId(1), true, None, 5);
        assert_eq!(emitted(&idle), vec![(&[Topic::Lobby][..], "connection_changed")]);
    }

    #[test]
    fn test_coming_online_joins_lobby_before_announcement() {
        let online = PresenceBroadcaster::connection_changed(PlayerId(4), true, None, 5);
        assert_eq!(online[0], Directive::subscribe(PlayerId(4), Topic::Lobby));
        assert!(matches!(online[1], Directive::Emit { .. }));

        let offline = PresenceBroadcaster::connection_changed(PlayerId(4), false, None, 6);
        assert_eq!(offline[0], Directive::unsubscribe(PlayerId(4), Topic::Lobby));
        assert!(matches!(offline[1], Directive::Emit { .. }));
    }
}
