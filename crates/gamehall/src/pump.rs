//! Background task feeding domain events to the presence dispatcher.

use std::sync::Arc;

use gamehall_matchmaking::QueueEvent;
use gamehall_presence::{Dispatcher, PresenceBroadcaster, Transport};
use gamehall_room::RoomEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Spawns the pump. It runs until either event channel closes.
///
/// A lagging pump drops the events it missed and carries on; presence is
/// best-effort and clients resync from `room_info`.
pub(crate) fn spawn_presence_pump<T: Transport>(
    dispatcher: Arc<Dispatcher<T>>,
    mut rooms: broadcast::Receiver<RoomEvent>,
    mut queue: broadcast::Receiver<QueueEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let directives = tokio::select! {
                event = rooms.recv() => match event {
                    Ok(event) => PresenceBroadcaster::room_event(&event),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "presence pump lagged behind room events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                event = queue.recv() => match event {
                    Ok(event) => PresenceBroadcaster::queue_event(&event),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "presence pump lagged behind queue events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            let stats = dispatcher.apply(directives).await;
            if stats.failed > 0 {
                tracing::debug!(?stats, "presence delivery partly failed");
            }
        }
        tracing::debug!("presence pump stopped");
    })
}
