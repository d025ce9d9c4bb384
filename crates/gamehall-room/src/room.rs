//! Room actor: an isolated Tokio task that owns one [`Room`].
//!
//! Every mutating operation is a command on the actor's channel, so
//! commands for one room are applied strictly one after another while
//! different rooms run in parallel. After each committed change the
//! actor publishes a fresh snapshot on a `watch` channel (read side of
//! `room_info`), hands it to the persistence writer, and broadcasts the
//! resulting events, in that order.
//!
//! Once the room reaches `finished` the actor exits. Its last snapshot
//! stays readable through the handle, and the handle answers later
//! commands from it.

use gamehall_protocol::{PlayerId, RoomId, RoomMember, RoomStatus};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::state::Room;
use crate::{CloseOutcome, CloseRequester, JoinOutcome, LeaveOutcome, RoomError, RoomEvent, RoomSnapshot};

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;
type Settings = serde_json::Map<String, serde_json::Value>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        member: RoomMember,
        password: Option<String>,
        reply: Reply<JoinOutcome>,
    },
    Leave {
        player_id: PlayerId,
        reply: oneshot::Sender<LeaveOutcome>,
    },
    Kick {
        requester: PlayerId,
        target: PlayerId,
        reply: Reply<RoomSnapshot>,
    },
    Start {
        requester: PlayerId,
        reply: Reply<RoomSnapshot>,
    },
    MarkPlaying {
        reply: Reply<RoomSnapshot>,
    },
    Close {
        requester: CloseRequester,
        reply: Reply<CloseOutcome>,
    },
    UpdateSettings {
        requester: PlayerId,
        patch: Settings,
        reply: Reply<RoomSnapshot>,
    },
    SetReady {
        player_id: PlayerId,
        ready: bool,
        reply: Reply<RoomSnapshot>,
    },
    Message {
        player_id: PlayerId,
        text: String,
        reply: Reply<()>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// RoomHandle
// ---------------------------------------------------------------------------

/// Handle to a running room actor.
///
/// Cheap to clone: an `mpsc::Sender` plus a `watch::Receiver`. The
/// registry holds one per room and clones it out so no registry lock is
/// held while a command is in flight.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
    snapshot: watch::Receiver<RoomSnapshot>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// The latest committed snapshot. Never waits on the actor.
    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> RoomStatus {
        self.snapshot.borrow().status
    }

    pub async fn join(
        &self,
        member: RoomMember,
        password: Option<String>,
    ) -> Result<JoinOutcome, RoomError> {
        let player_id = member.id;
        self.request(|reply| RoomCommand::Join {
            member,
            password,
            reply,
        })
        .await
        .unwrap_or_else(|room| {
            if room.contains(player_id) {
                Ok(JoinOutcome::AlreadyMember(room))
            } else {
                Err(RoomError::ClosedForJoining {
                    room: room.id,
                    status: room.status,
                })
            }
        })
    }

    pub async fn leave(&self, player_id: PlayerId) -> LeaveOutcome {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(RoomCommand::Leave {
                player_id,
                reply: tx,
            })
            .await
            .is_err()
        {
            return LeaveOutcome::ABSENT;
        }
        rx.await.unwrap_or(LeaveOutcome::ABSENT)
    }

    pub async fn kick(&self, requester: PlayerId, target: PlayerId) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Kick {
            requester,
            target,
            reply,
        })
        .await
        .unwrap_or_else(|room| Err(Self::finished(&room, "kick from")))
    }

    pub async fn start(&self, requester: PlayerId) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Start { requester, reply })
            .await
            .unwrap_or_else(|room| Err(Self::finished(&room, "start")))
    }

    pub async fn mark_playing(&self) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::MarkPlaying { reply })
            .await
            .unwrap_or_else(|room| Err(Self::finished(&room, "mark playing")))
    }

    pub async fn close(&self, requester: CloseRequester) -> Result<CloseOutcome, RoomError> {
        self.request(|reply| RoomCommand::Close { requester, reply })
            .await
            .unwrap_or_else(|room| {
                if room.status.is_terminal() {
                    Ok(CloseOutcome::AlreadyClosed)
                } else {
                    Err(RoomError::Unavailable(room.id))
                }
            })
    }

    pub async fn update_settings(
        &self,
        requester: PlayerId,
        patch: Settings,
    ) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::UpdateSettings {
            requester,
            patch,
            reply,
        })
        .await
        .unwrap_or_else(|room| Err(Self::finished(&room, "update settings of")))
    }

    pub async fn set_ready(
        &self,
        player_id: PlayerId,
        ready: bool,
    ) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::SetReady {
            player_id,
            ready,
            reply,
        })
        .await
        .unwrap_or_else(|room| Err(Self::finished(&room, "ready up in")))
    }

    pub async fn send_message(&self, player_id: PlayerId, text: String) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Message {
            player_id,
            text,
            reply,
        })
        .await
        .unwrap_or_else(|room| Err(Self::finished(&room, "send a message to")))
    }

    /// Tells the actor to stop without changing the room.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(RoomCommand::Shutdown).await;
    }

    /// Sends a command and waits for its reply. `Err` carries the final
    /// snapshot when the actor is no longer running.
    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<Result<T, RoomError>, RoomSnapshot> {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(command(tx)).await.is_err() {
            return Err(self.snapshot());
        }
        rx.await.map_err(|_| self.snapshot())
    }

    fn finished(room: &RoomSnapshot, operation: &'static str) -> RoomError {
        if room.status.is_terminal() {
            RoomError::InvalidState {
                room: room.id,
                status: room.status,
                operation,
            }
        } else {
            RoomError::Unavailable(room.id)
        }
    }
}

// ---------------------------------------------------------------------------
// RoomActor
// ---------------------------------------------------------------------------

struct RoomActor {
    room: Room,
    receiver: mpsc::Receiver<RoomCommand>,
    snapshot: watch::Sender<RoomSnapshot>,
    events: broadcast::Sender<RoomEvent>,
    persist: Option<mpsc::UnboundedSender<RoomSnapshot>>,
}

impl RoomActor {
    /// Runs the actor loop until the room finishes or is shut down.
    async fn run(mut self) {
        let room_id = self.room.id();
        tracing::debug!(%room_id, "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join {
                    member,
                    password,
                    reply,
                } => {
                    let player_id = member.id;
                    let result = match self.room.join(member, password.as_deref()) {
                        Ok(true) => {
                            let room = self.commit();
                            tracing::info!(
                                %room_id,
                                %player_id,
                                players = room.player_count(),
                                "player joined"
                            );
                            Ok(JoinOutcome::Joined(room))
                        }
                        Ok(false) => Ok(JoinOutcome::AlreadyMember(self.room.snapshot())),
                        Err(e) => {
                            tracing::debug!(%room_id, %player_id, error = %e, "join rejected");
                            Err(e)
                        }
                    };
                    let _ = reply.send(result);
                }
                RoomCommand::Leave { player_id, reply } => {
                    let outcome = self.room.leave(player_id);
                    if outcome.left {
                        let room = self.commit();
                        tracing::info!(
                            %room_id,
                            %player_id,
                            players = room.player_count(),
                            new_owner = ?outcome.new_owner,
                            destroyed = outcome.room_destroyed,
                            "player left"
                        );
                    }
                    let _ = reply.send(outcome);
                }
                RoomCommand::Kick {
                    requester,
                    target,
                    reply,
                } => {
                    let result = self.room.kick(requester, target).map(|()| {
                        tracing::info!(%room_id, player_id = %target, "player kicked");
                        self.commit()
                    });
                    let _ = reply.send(result);
                }
                RoomCommand::Start { requester, reply } => {
                    let result = self.room.start(requester).map(|()| {
                        let room = self.commit();
                        tracing::info!(%room_id, players = room.player_count(), "game started");
                        room
                    });
                    let _ = reply.send(result);
                }
                RoomCommand::MarkPlaying { reply } => {
                    let result = self.room.mark_playing().map(|()| {
                        tracing::info!(%room_id, "game playing");
                        self.commit()
                    });
                    let _ = reply.send(result);
                }
                RoomCommand::Close { requester, reply } => {
                    let result = self.room.close(requester);
                    if let Ok(CloseOutcome::Closed) = result {
                        self.commit();
                        tracing::info!(%room_id, ?requester, "room closed");
                    }
                    let _ = reply.send(result);
                }
                RoomCommand::UpdateSettings {
                    requester,
                    patch,
                    reply,
                } => {
                    let result = self.room.update_settings(requester, patch).map(|()| {
                        tracing::debug!(%room_id, "settings updated");
                        self.commit()
                    });
                    let _ = reply.send(result);
                }
                RoomCommand::SetReady {
                    player_id,
                    ready,
                    reply,
                } => {
                    let result = self.room.set_ready(player_id, ready).map(|changed| {
                        if changed {
                            tracing::debug!(%room_id, %player_id, ready, "ready changed");
                            self.commit()
                        } else {
                            self.room.snapshot()
                        }
                    });
                    let _ = reply.send(result);
                }
                RoomCommand::Message {
                    player_id,
                    text,
                    reply,
                } => {
                    let result = self.room.message(player_id, &text);
                    if result.is_ok() {
                        tracing::trace!(%room_id, %player_id, "chat message");
                        self.publish();
                    }
                    let _ = reply.send(result);
                }
                RoomCommand::Shutdown => {
                    tracing::debug!(%room_id, "room shutting down");
                    break;
                }
            }

            if self.room.status().is_terminal() {
                break;
            }
        }

        tracing::debug!(%room_id, status = %self.room.status(), "room actor stopped");
    }

    /// Publishes the committed state: snapshot first, then persistence,
    /// then events.
    fn commit(&mut self) -> RoomSnapshot {
        let room = self.room.snapshot();
        self.snapshot.send_replace(room.clone());
        if let Some(persist) = &self.persist {
            let _ = persist.send(room.clone());
        }
        self.publish();
        tracing::trace!(room_id = %room.id, version = self.room.version(), "room committed");
        room
    }

    /// Broadcasts queued events without touching the snapshot.
    fn publish(&mut self) {
        for event in self.room.take_events() {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }
}

/// Spawns a room actor and returns a handle to it.
///
/// The initial snapshot is persisted and a `Created` event broadcast
/// before this returns, so `Created` precedes every later event for
/// the room.
pub(crate) fn spawn_room(
    room: Room,
    channel_size: usize,
    events: broadcast::Sender<RoomEvent>,
    persist: Option<mpsc::UnboundedSender<RoomSnapshot>>,
) -> RoomHandle {
    let room_id = room.id();
    let initial = room.snapshot();
    let (tx, rx) = mpsc::channel(channel_size);
    let (snapshot_tx, snapshot_rx) = watch::channel(initial.clone());

    if let Some(persist) = &persist {
        let _ = persist.send(initial.clone());
    }
    let _ = events.send(RoomEvent::Created { room: initial });

    let actor = RoomActor {
        room,
        receiver: rx,
        snapshot: snapshot_tx,
        events,
        persist,
    };
    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        sender: tx,
        snapshot: snapshot_rx,
    }
}
