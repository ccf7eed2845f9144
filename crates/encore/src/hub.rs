//! Broadcaster: drains each room's event stream and fans it out.
//!
//! Every connection owns a bounded outbound queue drained by its writer
//! task. The hub keeps, per room, the outbound sender of each member
//! connection. A forwarder task per room reads the room's
//! [`EventStream`](encore_room::EventStream) and pushes each event to every
//! member with `try_send`; a slow client loses messages instead of
//! stalling the room.
//!
//! ```text
//! Room ──try_send──→ EventStream ──forwarder──→ Hub ──try_send──→ per-connection queue ──→ writer ──→ socket
//! ```
//!
//! The hub also tracks which connection currently speaks for each player.
//! A player has at most one live connection: claiming the player from a
//! new connection evicts the old one.

use std::collections::HashMap;
use std::sync::Arc;

use encore_protocol::{PlayerId, RoomId, ServerMessage};
use encore_room::Room;
use encore_transport::ConnectionId;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, RwLock, oneshot};

/// Sending half of a connection's outbound queue.
pub type Outbound = mpsc::Sender<ServerMessage>;

/// Resolves when a newer connection claims the same player.
pub type Eviction = oneshot::Receiver<()>;

/// Per-room membership and fan-out.
#[derive(Default)]
pub struct Hub {
    rooms: RwLock<HashMap<RoomId, HashMap<PlayerId, Outbound>>>,
    /// Live connection per player, with the trigger that evicts it.
    sessions: Mutex<HashMap<PlayerId, (ConnectionId, oneshot::Sender<()>)>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `conn_id` the live connection for `player_id`.
    ///
    /// Any previous connection for the player is told to go away through
    /// its [`Eviction`].
    pub async fn claim(&self, player_id: &PlayerId, conn_id: ConnectionId) -> Eviction {
        let (tx, rx) = oneshot::channel();
        let previous = self
            .sessions
            .lock()
            .await
            .insert(player_id.clone(), (conn_id, tx));
        if let Some((old_conn, evict)) = previous {
            tracing::info!(%player_id, %old_conn, new_conn = %conn_id, "player reconnected, evicting old connection");
            let _ = evict.send(());
        }
        rx
    }

    /// Gives up `player_id` if `conn_id` still holds it.
    pub async fn release(&self, player_id: &PlayerId, conn_id: ConnectionId) {
        let mut sessions = self.sessions.lock().await;
        if sessions
            .get(player_id)
            .is_some_and(|(current, _)| *current == conn_id)
        {
            sessions.remove(player_id);
        }
    }

    /// The connection currently speaking for `player_id`.
    pub async fn connection_of(&self, player_id: &PlayerId) -> Option<ConnectionId> {
        self.sessions
            .lock()
            .await
            .get(player_id)
            .map(|(conn_id, _)| *conn_id)
    }

    /// Starts forwarding `room`'s events to its members.
    ///
    /// Returns `false` if the room's stream was already taken, which means
    /// another forwarder owns it.
    pub async fn attach(self: &Arc<Self>, room: &Room) -> bool {
        let Some(mut events) = room.take_events() else {
            return false;
        };
        let room_id = room.id().clone();
        self.rooms.write().await.entry(room_id.clone()).or_default();

        let hub = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let kind = event.kind();
                let delivered = hub
                    .broadcast(
                        &room_id,
                        ServerMessage::Event {
                            room_id: room_id.clone(),
                            event,
                        },
                    )
                    .await;
                tracing::trace!(%room_id, event = kind, delivered, "event fanned out");
            }
            hub.rooms.write().await.remove(&room_id);
            tracing::debug!(%room_id, "event stream ended, forwarder stopped");
        });
        true
    }

    /// Adds a connection to a room's audience, replacing any previous
    /// connection for the same player.
    pub async fn register(&self, room_id: &RoomId, player_id: PlayerId, outbound: Outbound) {
        let mut rooms = self.rooms.write().await;
        match rooms.get_mut(room_id) {
            Some(members) => {
                members.insert(player_id, outbound);
            }
            None => {
                tracing::debug!(%room_id, %player_id, "room has no forwarder, not registering");
            }
        }
    }

    /// Removes a connection from a room's audience.
    ///
    /// Only removes the entry if it still belongs to `outbound`, so a stale
    /// connection can't unregister the player's newer one.
    pub async fn unregister(&self, room_id: &RoomId, player_id: &PlayerId, outbound: &Outbound) {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(room_id) else {
            return;
        };
        if members
            .get(player_id)
            .is_some_and(|current| current.same_channel(outbound))
        {
            members.remove(player_id);
        }
    }

    /// Pushes `msg` to every member of `room_id` without waiting.
    ///
    /// Returns how many connections accepted it.
    pub async fn broadcast(&self, room_id: &RoomId, msg: ServerMessage) -> usize {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(room_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (player_id, outbound) in members {
            match outbound.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(%room_id, %player_id, "outbound queue full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(%room_id, %player_id, "connection gone, dropping message");
                }
            }
        }
        delivered
    }

    /// Number of connections currently listening to `room_id`.
    pub async fn member_count(&self, room_id: &RoomId) -> usize {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map_or(0, HashMap::len)
    }

    /// `true` while a forwarder is running for `room_id`.
    pub async fn is_attached(&self, room_id: &RoomId) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }
}
