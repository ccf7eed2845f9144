//! The room: a lock-guarded state machine that emits events.
//!
//! A [`Room`] owns all of its mutable state behind a single
//! `tokio::sync::RwLock`. Every mutation takes the write lock for the
//! whole check-and-update, so concurrent callers are serialized and the
//! state machine can never be observed half-applied. Accessors take the
//! read lock and may run concurrently with each other.
//!
//! ```text
//! caller ──→ write lock ──→ legality check ──→ mutate ──→ try-enqueue event ──→ unlock
//!                                                               │
//!                                                               ▼
//!                                                 EventStream (drained elsewhere)
//! ```
//!
//! Nothing under the lock awaits anything other than the lock itself.
//! The one time-bounded wait (final event delivery in [`Room::close`])
//! happens after the lock has been released.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use encore_protocol::{
    GameMode, Player, PlayerId, RoomEvent, RoomId, RoomSnapshot, RoomStatus, RoomSummary, Song,
};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::events::{EventEmitter, EventStream};
use crate::{LifecycleConfig, RoomConfig, RoomError};

/// A seated player plus the join order used for host hand-off.
struct Seat {
    player: Player,
    /// Strictly increasing per room. Breaks ties between equal `joined_at`.
    seq: u64,
}

/// Everything that changes over a room's lifetime.
struct RoomInner {
    status: RoomStatus,
    players: HashMap<PlayerId, Seat>,
    selected_song: Option<Song>,
    host_id: Option<PlayerId>,
    updated_at: DateTime<Utc>,
    /// Monotonic; never moves backwards.
    last_active: Instant,
    next_seq: u64,
    emitter: EventEmitter,
}

impl RoomInner {
    /// Records activity on a state-affecting operation.
    fn touch(&mut self) {
        self.last_active = self.last_active.max(Instant::now());
        self.updated_at = Utc::now();
    }

    /// Enqueues an event unless the room has closed.
    fn emit(&mut self, event: RoomEvent) {
        if self.status == RoomStatus::Closed {
            return;
        }
        self.emitter.emit(event);
    }

    fn transition(&mut self, room_id: &RoomId, to: RoomStatus) {
        let from = self.status;
        debug_assert!(
            from.can_transition_to(to),
            "illegal room transition {from} -> {to}"
        );
        self.status = to;
        tracing::info!(room_id = %room_id, %from, %to, "room status changed");
    }

    fn all_ready(&self) -> bool {
        self.players.values().all(|seat| seat.player.is_ready)
    }
}

/// One multiplayer session, from formation to the end of a round.
///
/// Construct with [`Room::new`] (usually via the
/// [`RoomManager`](crate::RoomManager)), then share it behind an `Arc`.
/// All methods take `&self`.
pub struct Room {
    id: RoomId,
    name: String,
    join_code: String,
    max_players: usize,
    password: Option<String>,
    game_mode: GameMode,
    difficulty: String,
    created_at: DateTime<Utc>,
    created: Instant,
    lifecycle: LifecycleConfig,
    state: RwLock<RoomInner>,
    /// Handed out once to the broadcaster.
    events: Mutex<Option<EventStream>>,
}

impl Room {
    /// Creates an empty room in `Waiting`.
    ///
    /// An empty password string is treated as "no password".
    pub fn new(
        id: RoomId,
        join_code: impl Into<String>,
        config: RoomConfig,
        lifecycle: LifecycleConfig,
    ) -> Self {
        let (emitter, stream) =
            EventEmitter::channel(id.clone(), lifecycle.event_capacity);
        let now = Utc::now();
        let created = Instant::now();

        Self {
            id,
            name: config.name,
            join_code: join_code.into(),
            max_players: config.max_players,
            password: config.password.filter(|p| !p.is_empty()),
            game_mode: config.game_mode,
            difficulty: config.difficulty,
            created_at: now,
            created,
            lifecycle,
            state: RwLock::new(RoomInner {
                status: RoomStatus::Waiting,
                players: HashMap::new(),
                selected_song: None,
                host_id: None,
                updated_at: now,
                last_active: created,
                next_seq: 0,
                emitter,
            }),
            events: Mutex::new(Some(stream)),
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Seats a player.
    ///
    /// The first player into an empty room becomes host. Filling the last
    /// seat of a `Waiting` room moves it to `Preparing`.
    ///
    /// # Errors
    /// - [`RoomError::InvalidState`] unless the room is Waiting or Preparing
    /// - [`RoomError::RoomFull`] if every seat is taken
    /// - [`RoomError::DuplicatePlayer`] if the player is already seated
    pub async fn join(
        &self,
        player_id: PlayerId,
        name: impl Into<String>,
    ) -> Result<Player, RoomError> {
        let mut guard = self.state.write().await;
        let inner = &mut *guard;

        if !inner.status.is_joinable() {
            return Err(RoomError::InvalidState {
                operation: "join",
                status: inner.status,
            });
        }
        if inner.players.len() >= self.max_players {
            return Err(RoomError::RoomFull);
        }
        if inner.players.contains_key(&player_id) {
            return Err(RoomError::DuplicatePlayer(player_id));
        }

        let player = Player {
            id: player_id.clone(),
            name: name.into(),
            is_host: inner.players.is_empty(),
            is_ready: false,
            joined_at: Utc::now(),
        };
        let seq = inner.next_seq;
        inner.next_seq += 1;

        if player.is_host {
            inner.host_id = Some(player_id.clone());
        }
        inner.players.insert(
            player_id.clone(),
            Seat {
                player: player.clone(),
                seq,
            },
        );

        if inner.players.len() == self.max_players
            && inner.status == RoomStatus::Waiting
        {
            inner.transition(&self.id, RoomStatus::Preparing);
        }

        inner.touch();
        let current_players = inner.players.len();
        inner.emit(RoomEvent::PlayerJoined {
            player: player.clone(),
            current_players,
        });

        tracing::info!(
            room_id = %self.id,
            %player_id,
            players = current_players,
            is_host = player.is_host,
            "player joined"
        );
        Ok(player)
    }

    /// Removes a player.
    ///
    /// If the host leaves and others remain, the earliest-joined remaining
    /// player becomes host. A `Preparing` room that drops below capacity
    /// (but is not empty) falls back to `Waiting` and every ready flag is
    /// cleared. An emptied room keeps
    /// its status until it expires.
    ///
    /// Returns the new host, if the host changed.
    ///
    /// # Errors
    /// - [`RoomError::PlayerNotFound`] if the player isn't seated
    /// - [`RoomError::InvalidState`] if the room is closed
    pub async fn leave(
        &self,
        player_id: &PlayerId,
    ) -> Result<Option<PlayerId>, RoomError> {
        let mut guard = self.state.write().await;
        let inner = &mut *guard;

        if inner.status == RoomStatus::Closed {
            return Err(RoomError::InvalidState {
                operation: "leave",
                status: inner.status,
            });
        }
        let seat = inner
            .players
            .remove(player_id)
            .ok_or_else(|| RoomError::PlayerNotFound(player_id.clone()))?;

        let mut new_host = None;
        if seat.player.is_host {
            let successor = inner
                .players
                .values_mut()
                .min_by_key(|s| (s.player.joined_at, s.seq));
            if let Some(next) = successor {
                next.player.is_host = true;
                new_host = Some(next.player.id.clone());
            }
            inner.host_id = new_host.clone();
        }

        let remaining = inner.players.len();
        if remaining > 0
            && remaining < self.max_players
            && inner.status == RoomStatus::Preparing
        {
            inner.transition(&self.id, RoomStatus::Waiting);
            for seat in inner.players.values_mut() {
                seat.player.is_ready = false;
            }
        }

        inner.touch();
        inner.emit(RoomEvent::PlayerLeft {
            player_id: player_id.clone(),
            new_host: new_host.clone(),
        });

        tracing::info!(
            room_id = %self.id,
            %player_id,
            players = remaining,
            new_host = ?new_host,
            "player left"
        );
        Ok(new_host)
    }

    /// Sets a player's ready flag.
    ///
    /// When every seat is filled and every player is ready, the room moves
    /// to `Ready`.
    ///
    /// # Errors
    /// - [`RoomError::PlayerNotFound`] if the player isn't seated
    /// - [`RoomError::InvalidState`] unless the room is Preparing
    /// - [`RoomError::SongNotSelected`] if the host hasn't picked a song
    pub async fn set_ready(
        &self,
        player_id: &PlayerId,
        ready: bool,
    ) -> Result<(), RoomError> {
        let mut guard = self.state.write().await;
        let inner = &mut *guard;

        if !inner.players.contains_key(player_id) {
            return Err(RoomError::PlayerNotFound(player_id.clone()));
        }
        if inner.status != RoomStatus::Preparing {
            return Err(RoomError::InvalidState {
                operation: "ready up",
                status: inner.status,
            });
        }
        if inner.selected_song.is_none() {
            return Err(RoomError::SongNotSelected);
        }

        if let Some(seat) = inner.players.get_mut(player_id) {
            seat.player.is_ready = ready;
        }

        if inner.players.len() == self.max_players && inner.all_ready() {
            inner.transition(&self.id, RoomStatus::Ready);
        }

        inner.touch();
        inner.emit(RoomEvent::PlayerReadyChanged {
            player_id: player_id.clone(),
            is_ready: ready,
        });

        tracing::debug!(room_id = %self.id, %player_id, ready, "ready changed");
        Ok(())
    }

    /// Picks the song for the next round. Host only.
    ///
    /// Changing the song clears every player's ready flag.
    ///
    /// # Errors
    /// - [`RoomError::NotHost`] unless the caller is the current host
    /// - [`RoomError::InvalidState`] unless the room is Preparing
    pub async fn select_song(
        &self,
        player_id: &PlayerId,
        song: Song,
    ) -> Result<(), RoomError> {
        let mut guard = self.state.write().await;
        let inner = &mut *guard;

        if inner.host_id.as_ref() != Some(player_id) {
            return Err(RoomError::NotHost(player_id.clone()));
        }
        if inner.status != RoomStatus::Preparing {
            return Err(RoomError::InvalidState {
                operation: "select a song",
                status: inner.status,
            });
        }

        for seat in inner.players.values_mut() {
            seat.player.is_ready = false;
        }
        inner.selected_song = Some(song.clone());

        inner.touch();
        tracing::info!(room_id = %self.id, song_id = %song.id, "song selected");
        inner.emit(RoomEvent::SongSelected { song });
        Ok(())
    }

    /// Starts the round. Host only.
    ///
    /// # Errors
    /// - [`RoomError::NotHost`] unless the caller is the current host
    /// - [`RoomError::RoomNotReady`] unless the room is Ready
    pub async fn start_game(&self, player_id: &PlayerId) -> Result<(), RoomError> {
        let mut guard = self.state.write().await;
        let inner = &mut *guard;

        if inner.host_id.as_ref() != Some(player_id) {
            return Err(RoomError::NotHost(player_id.clone()));
        }
        if inner.status != RoomStatus::Ready {
            return Err(RoomError::RoomNotReady {
                status: inner.status,
            });
        }

        inner.transition(&self.id, RoomStatus::Playing);
        inner.touch();
        inner.emit(RoomEvent::GameStarting {
            countdown: self.lifecycle.countdown_secs,
        });
        Ok(())
    }

    /// Ends the round.
    ///
    /// Any caller may end the game; there is no host check. The move to
    /// `Finished` happens from whatever non-closed status the room is in.
    ///
    /// # Errors
    /// - [`RoomError::InvalidState`] if the room is closed
    pub async fn end_game(&self) -> Result<(), RoomError> {
        let mut guard = self.state.write().await;
        let inner = &mut *guard;

        if inner.status == RoomStatus::Closed {
            return Err(RoomError::InvalidState {
                operation: "end the game",
                status: inner.status,
            });
        }
        if inner.status != RoomStatus::Playing {
            tracing::debug!(
                room_id = %self.id,
                status = %inner.status,
                "ending game outside of Playing"
            );
        }

        let from = inner.status;
        inner.transition(&self.id, RoomStatus::Finished);
        inner.touch();
        inner.emit(RoomEvent::GameEnded {});

        tracing::info!(room_id = %self.id, %from, "game ended");
        Ok(())
    }

    /// Closes the room for good. Idempotent.
    ///
    /// The first call marks the room `Closed` and takes the event sender
    /// while holding the write lock, then releases the lock before trying
    /// to deliver `room_closed`. Delivery waits at most `close_timeout`;
    /// after a further `close_grace` pause the sender is dropped, which
    /// closes the stream. The pause is a heuristic that gives a draining
    /// consumer a chance to read the final event; it is not an
    /// acknowledgement.
    ///
    /// Returns `true` if this call closed the room, `false` if it was
    /// already closed.
    pub async fn close(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let sender = {
            let mut inner = self.state.write().await;
            if inner.status == RoomStatus::Closed {
                return false;
            }
            let from = inner.status;
            inner.status = RoomStatus::Closed;
            inner.touch();
            tracing::info!(room_id = %self.id, %from, %reason, "room closed");
            inner.emitter.take_sender()
        };

        let Some(sender) = sender else {
            return true;
        };

        let event = RoomEvent::RoomClosed { reason };
        if let Err(e) = sender.send_timeout(event, self.lifecycle.close_timeout).await {
            tracing::warn!(
                room_id = %self.id,
                error = %e,
                "final room_closed event not delivered"
            );
        }

        tokio::time::sleep(self.lifecycle.close_grace).await;
        drop(sender);
        true
    }

    // -----------------------------------------------------------------------
    // Expiry
    // -----------------------------------------------------------------------

    /// Returns `true` if the registry should reclaim this room.
    ///
    /// A room is expired when it is closed, when it is older than
    /// `max_age`, or when it is empty and has been idle longer than
    /// `empty_idle_timeout`.
    pub async fn is_expired(&self) -> bool {
        let inner = self.state.read().await;

        if inner.status == RoomStatus::Closed {
            return true;
        }

        let now = Instant::now();
        if now.duration_since(self.created) > self.lifecycle.max_age {
            return true;
        }

        inner.players.is_empty()
            && now.duration_since(inner.last_active) > self.lifecycle.empty_idle_timeout
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Full read-only projection. The password is reduced to a flag.
    pub async fn snapshot(&self) -> RoomSnapshot {
        let inner = self.state.read().await;
        RoomSnapshot {
            room_id: self.id.clone(),
            room_name: self.name.clone(),
            join_code: self.join_code.clone(),
            max_players: self.max_players,
            has_password: self.password.is_some(),
            game_mode: self.game_mode,
            difficulty: self.difficulty.clone(),
            status: inner.status,
            players: inner.players.values().map(|s| s.player.clone()).collect(),
            selected_song: inner.selected_song.clone(),
            host_id: inner.host_id.clone(),
            created_at: self.created_at,
            updated_at: inner.updated_at,
        }
    }

    /// Compact listing row.
    pub async fn summary(&self) -> RoomSummary {
        let inner = self.state.read().await;
        RoomSummary {
            room_id: self.id.clone(),
            room_name: self.name.clone(),
            current_players: inner.players.len(),
            max_players: self.max_players,
            status: inner.status,
            has_password: self.password.is_some(),
            game_mode: self.game_mode,
            host_name: host_name(&inner),
            created_at: self.created_at,
        }
    }

    /// `true` if the room has no password or `candidate` matches it.
    pub fn validate_password(&self, candidate: &str) -> bool {
        self.password.as_deref().is_none_or(|p| p == candidate)
    }

    pub async fn player_count(&self) -> usize {
        self.state.read().await.players.len()
    }

    /// Display name of the current host, if anyone is seated.
    pub async fn host_name(&self) -> Option<String> {
        host_name(&*self.state.read().await)
    }

    pub async fn has_player(&self, player_id: &PlayerId) -> bool {
        self.state.read().await.players.contains_key(player_id)
    }

    /// Ids of everyone currently seated, in no particular order.
    pub async fn player_ids(&self) -> Vec<PlayerId> {
        self.state.read().await.players.keys().cloned().collect()
    }

    pub async fn status(&self) -> RoomStatus {
        self.state.read().await.status
    }

    /// How many events were discarded because the queue was full.
    pub async fn dropped_events(&self) -> u64 {
        self.state.read().await.emitter.dropped()
    }

    /// Hands out the event stream. Only the first call gets it.
    pub fn take_events(&self) -> Option<EventStream> {
        self.events.lock().ok().and_then(|mut slot| slot.take())
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn join_code(&self) -> &str {
        &self.join_code
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    pub fn game_mode(&self) -> GameMode {
        self.game_mode
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

fn host_name(inner: &RoomInner) -> Option<String> {
    inner
        .host_id
        .as_ref()
        .and_then(|id| inner.players.get(id))
        .map(|seat| seat.player.name.clone())
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("join_code", &self.join_code)
            .field("max_players", &self.max_players)
            .finish_non_exhaustive()
    }
}
