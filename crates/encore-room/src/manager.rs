//! Room manager: creates rooms, indexes them, and reclaims expired ones.
//!
//! The manager has its own `RwLock`, separate from every room's lock.
//! Lock order is always manager → room, never the reverse, and the
//! manager lock is released before awaiting on a room wherever possible.

use std::collections::HashMap;
use std::sync::Arc;

use encore_protocol::{GameMode, PlayerId, RegistryStats, RoomId, RoomStatus, RoomSummary};
use rand::Rng;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::{RegistryConfig, Room, RoomConfig, RoomError};

/// Characters used in join codes. Uppercase only, so lookups can
/// normalize user input with `to_ascii_uppercase`.
const JOIN_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const JOIN_CODE_LEN: usize = 6;

#[derive(Default)]
struct Indexes {
    rooms: HashMap<RoomId, Arc<Room>>,
    /// Join code → room. Codes are stored uppercase.
    join_codes: HashMap<String, RoomId>,
    /// A player sits in at most one room at a time.
    player_rooms: HashMap<PlayerId, RoomId>,
}

/// Optional filters for [`RoomManager::list_rooms`].
#[derive(Debug, Clone, Default)]
pub struct RoomFilter {
    pub status: Option<RoomStatus>,
    pub game_mode: Option<GameMode>,
}

/// Directory of live rooms.
///
/// Entry point for higher layers: the connection handler looks rooms up
/// here, and the cleanup task uses it to close rooms that have expired.
pub struct RoomManager {
    config: RegistryConfig,
    indexes: RwLock<Indexes>,
}

impl RoomManager {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            indexes: RwLock::new(Indexes::default()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Creates and registers a new room.
    ///
    /// # Errors
    /// [`RoomError::InvalidCapacity`] if `max_players` is outside the
    /// configured range.
    pub async fn create_room(&self, config: RoomConfig) -> Result<Arc<Room>, RoomError> {
        let (min, max) = (self.config.min_players, self.config.max_players);
        if config.max_players < min || config.max_players > max {
            return Err(RoomError::InvalidCapacity {
                requested: config.max_players,
                min,
                max,
            });
        }

        let mut indexes = self.indexes.write().await;

        let mut room_id = generate_room_id();
        while indexes.rooms.contains_key(&room_id) {
            room_id = generate_room_id();
        }
        let mut join_code = generate_join_code();
        while indexes.join_codes.contains_key(&join_code) {
            join_code = generate_join_code();
        }

        let name = config.name.clone();
        let max_players = config.max_players;
        let game_mode = config.game_mode;
        let room = Arc::new(Room::new(
            room_id.clone(),
            join_code.clone(),
            config,
            self.config.lifecycle.clone(),
        ));

        indexes.rooms.insert(room_id.clone(), Arc::clone(&room));
        indexes.join_codes.insert(join_code.clone(), room_id.clone());

        tracing::info!(
            %room_id,
            %join_code,
            %name,
            max_players,
            mode = %game_mode,
            "room created"
        );
        Ok(room)
    }

    /// # Errors
    /// [`RoomError::NotFound`] if no such room is registered.
    pub async fn get_room(&self, room_id: &RoomId) -> Result<Arc<Room>, RoomError> {
        self.indexes
            .read()
            .await
            .rooms
            .get(room_id)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))
    }

    /// Looks a room up by join code. Case-insensitive.
    ///
    /// # Errors
    /// [`RoomError::UnknownJoinCode`] if the code isn't registered.
    pub async fn find_by_join_code(&self, code: &str) -> Result<Arc<Room>, RoomError> {
        let normalized = code.trim().to_ascii_uppercase();
        let indexes = self.indexes.read().await;
        indexes
            .join_codes
            .get(&normalized)
            .and_then(|room_id| indexes.rooms.get(room_id))
            .cloned()
            .ok_or_else(|| RoomError::UnknownJoinCode(code.to_string()))
    }

    /// Seats a player in a room, enforcing one room per player.
    ///
    /// The player's index entry is reserved before the room join and
    /// rolled back if the join fails, so two concurrent joins by the same
    /// player can't both land.
    ///
    /// # Errors
    /// - [`RoomError::AlreadyInRoom`] if the player is seated anywhere
    /// - [`RoomError::NotFound`] if the room doesn't exist
    /// - [`RoomError::WrongPassword`] if the password doesn't match
    /// - anything [`Room::join`] returns
    pub async fn join_room(
        &self,
        room_id: &RoomId,
        player_id: PlayerId,
        player_name: &str,
        password: Option<&str>,
    ) -> Result<Arc<Room>, RoomError> {
        let room = {
            let mut indexes = self.indexes.write().await;
            if let Some(current) = indexes.player_rooms.get(&player_id) {
                return Err(RoomError::AlreadyInRoom {
                    player: player_id,
                    room: current.clone(),
                });
            }
            let room = indexes
                .rooms
                .get(room_id)
                .cloned()
                .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
            if !room.validate_password(password.unwrap_or_default()) {
                return Err(RoomError::WrongPassword);
            }
            indexes.player_rooms.insert(player_id.clone(), room_id.clone());
            room
        };

        if let Err(e) = room.join(player_id.clone(), player_name).await {
            let mut indexes = self.indexes.write().await;
            if indexes.player_rooms.get(&player_id) == Some(room_id) {
                indexes.player_rooms.remove(&player_id);
            }
            return Err(e);
        }

        tracing::debug!(%room_id, %player_id, "player indexed to room");
        Ok(room)
    }

    /// Removes a player from whichever room they're in.
    ///
    /// The room itself stays registered even if it is now empty; the
    /// expiry scan reclaims it.
    ///
    /// # Errors
    /// - [`RoomError::NotInRoom`] if the player isn't seated anywhere
    /// - anything [`Room::leave`] returns
    pub async fn leave_room(&self, player_id: &PlayerId) -> Result<RoomId, RoomError> {
        let (room_id, room) = {
            let indexes = self.indexes.read().await;
            let room_id = indexes
                .player_rooms
                .get(player_id)
                .cloned()
                .ok_or_else(|| RoomError::NotInRoom(player_id.clone()))?;
            let room = indexes
                .rooms
                .get(&room_id)
                .cloned()
                .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
            (room_id, room)
        };

        room.leave(player_id).await?;

        let mut indexes = self.indexes.write().await;
        if indexes.player_rooms.get(player_id) == Some(&room_id) {
            indexes.player_rooms.remove(player_id);
        }
        Ok(room_id)
    }

    /// The room a player is currently seated in, if any.
    pub async fn player_room(&self, player_id: &PlayerId) -> Option<Arc<Room>> {
        let indexes = self.indexes.read().await;
        indexes
            .player_rooms
            .get(player_id)
            .and_then(|room_id| indexes.rooms.get(room_id))
            .cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.indexes.read().await.rooms.len()
    }

    /// Lists rooms matching `filter`, oldest first.
    ///
    /// `page` is 1-based. Returns the requested page and the total number
    /// of matches.
    pub async fn list_rooms(
        &self,
        filter: &RoomFilter,
        page: usize,
        limit: usize,
    ) -> (Vec<RoomSummary>, usize) {
        let mut matches = Vec::new();
        for room in self.all_rooms().await {
            if filter.game_mode.is_some_and(|mode| mode != room.game_mode()) {
                continue;
            }
            let summary = room.summary().await;
            if filter.status.is_some_and(|status| status != summary.status) {
                continue;
            }
            matches.push(summary);
        }
        matches.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.room_id.cmp(&b.room_id))
        });

        let total = matches.len();
        let start = page.saturating_sub(1).saturating_mul(limit);
        let rooms = matches.into_iter().skip(start).take(limit).collect();
        (rooms, total)
    }

    pub async fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for room in self.all_rooms().await {
            let summary = room.summary().await;
            stats.total_rooms += 1;
            stats.total_players += summary.current_players;
            *stats.by_status.entry(summary.status).or_default() += 1;
            *stats.by_mode.entry(summary.game_mode).or_default() += 1;
        }
        stats
    }

    /// Closes a room and drops it from every index.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if no such room is registered.
    pub async fn close_room(&self, room_id: &RoomId, reason: &str) -> Result<(), RoomError> {
        let room = self.remove_room(room_id).await?;
        room.close(reason).await;
        Ok(())
    }

    /// Closes and unregisters every expired room. Returns their ids.
    pub async fn cleanup(&self) -> Vec<RoomId> {
        let mut expired = Vec::new();
        for room in self.all_rooms().await {
            if room.is_expired().await {
                expired.push(room.id().clone());
            }
        }

        for room_id in &expired {
            if let Err(e) = self.close_room(room_id, "timeout").await {
                tracing::debug!(%room_id, error = %e, "expired room already removed");
                continue;
            }
            tracing::info!(%room_id, "expired room reclaimed");
        }
        expired
    }

    /// Spawns a task that calls [`cleanup`](Self::cleanup) every
    /// `cleanup_interval` until the returned handle is stopped.
    pub fn spawn_cleanup(self: &Arc<Self>) -> CleanupTask {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let period = self.config.cleanup_interval;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; skip it.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let reclaimed = manager.cleanup().await;
                        if !reclaimed.is_empty() {
                            tracing::info!(count = reclaimed.len(), "cleanup pass reclaimed rooms");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::debug!("cleanup task stopped");
        });

        CleanupTask {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Closes every room with reason `server_shutdown` and empties the
    /// indexes.
    pub async fn shutdown(&self) {
        let rooms: Vec<Arc<Room>> = {
            let mut indexes = self.indexes.write().await;
            indexes.join_codes.clear();
            indexes.player_rooms.clear();
            indexes.rooms.drain().map(|(_, room)| room).collect()
        };
        for room in &rooms {
            room.close("server_shutdown").await;
        }
        tracing::info!(rooms = rooms.len(), "room manager shut down");
    }

    async fn all_rooms(&self) -> Vec<Arc<Room>> {
        self.indexes.read().await.rooms.values().cloned().collect()
    }

    async fn remove_room(&self, room_id: &RoomId) -> Result<Arc<Room>, RoomError> {
        let mut indexes = self.indexes.write().await;
        let room = indexes
            .rooms
            .remove(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        indexes.join_codes.remove(room.join_code());
        indexes.player_rooms.retain(|_, rid| rid != room_id);
        tracing::info!(%room_id, "room removed");
        Ok(room)
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

/// Handle to the background cleanup task.
pub struct CleanupTask {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CleanupTask {
    /// Signals the task to stop and waits for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

fn generate_room_id() -> RoomId {
    let bytes: [u8; 8] = rand::rng().random();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    RoomId(format!("room_{hex}"))
}

fn generate_join_code() -> String {
    let mut rng = rand::rng();
    (0..JOIN_CODE_LEN)
        .map(|_| char::from(JOIN_CODE_CHARS[rng.random_range(0..JOIN_CODE_CHARS.len())]))
        .collect()
}
