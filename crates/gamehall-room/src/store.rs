//! Write-behind persistence of room snapshots.
//!
//! Room actors never await a store. After each commit the actor pushes
//! its new snapshot into an unbounded channel, and a single writer task
//! drains it in order. Because writes are conditional on
//! [`RoomSnapshot::version`], a late or retried write can never roll a
//! stored room back.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::{PersistenceError, RoomSnapshot};

/// What a conditional write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreWrite {
    /// The snapshot was newer than the stored one and replaced it.
    Applied,
    /// The store already held this version or a newer one.
    Stale,
}

/// Durable storage for rooms.
///
/// `save` must upsert only when `room.version` is strictly greater than
/// the version currently stored for `room.id`.
pub trait RoomStore: Send + Sync + 'static {
    fn save(
        &self,
        room: &RoomSnapshot,
    ) -> impl Future<Output = Result<StoreWrite, PersistenceError>> + Send;
}

/// Spawns the writer task and returns the sender actors push into.
///
/// The task exits once every sender (the registry's and each room
/// actor's) has been dropped.
pub(crate) fn spawn_writer<S: RoomStore>(
    store: S,
    timeout: Duration,
) -> mpsc::UnboundedSender<RoomSnapshot> {
    let (tx, mut rx) = mpsc::unbounded_channel::<RoomSnapshot>();

    tokio::spawn(async move {
        while let Some(room) = rx.recv().await {
            let result = match tokio::time::timeout(timeout, store.save(&room)).await {
                Ok(result) => result,
                Err(_) => Err(PersistenceError::Timeout(timeout)),
            };
            match result {
                Ok(StoreWrite::Applied) => {
                    tracing::trace!(room_id = %room.id, version = room.version, "room persisted");
                }
                Ok(StoreWrite::Stale) => {
                    tracing::debug!(
                        room_id = %room.id,
                        version = room.version,
                        "store already newer, write skipped"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        room_id = %room.id,
                        version = room.version,
                        %error,
                        "room persistence failed"
                    );
                }
            }
        }
        tracing::debug!("room writer stopped");
    });

    tx
}
