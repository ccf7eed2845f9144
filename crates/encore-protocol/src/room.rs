//! Room-level data that leaves the room: events, snapshots, and listings.
//!
//! A room never hands out references to its internal state. Instead it
//! produces owned values from this module: a [`RoomEvent`] whenever a
//! state change completes, a [`RoomSnapshot`] when someone asks for the
//! full picture, and a [`RoomSummary`] for directory listings.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GameMode, Player, PlayerId, RoomId, RoomStatus, Song};

// ---------------------------------------------------------------------------
// RoomEvent
// ---------------------------------------------------------------------------

/// A one-way notification describing a completed state change.
///
/// Adjacently tagged so every event has the same outer shape:
///
/// ```text
/// { "event": "player_ready_changed", "data": { "player_id": "a", "is_ready": true } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RoomEvent {
    PlayerJoined {
        player: Player,
        current_players: usize,
    },
    PlayerLeft {
        player_id: PlayerId,
        /// Set only when the departing player was host.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_host: Option<PlayerId>,
    },
    PlayerReadyChanged {
        player_id: PlayerId,
        is_ready: bool,
    },
    SongSelected {
        song: Song,
    },
    GameStarting {
        countdown: u32,
    },
    GameEnded {},
    RoomClosed {
        reason: String,
    },
    /// A chat line. Relayed by the server; never emitted by a room.
    ChatMessage {
        player_id: PlayerId,
        text: String,
        /// Unix seconds.
        timestamp: i64,
    },
}

impl RoomEvent {
    /// The event label as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlayerJoined { .. } => "player_joined",
            Self::PlayerLeft { .. } => "player_left",
            Self::PlayerReadyChanged { .. } => "player_ready_changed",
            Self::SongSelected { .. } => "song_selected",
            Self::GameStarting { .. } => "game_starting",
            Self::GameEnded {} => "game_ended",
            Self::RoomClosed { .. } => "room_closed",
            Self::ChatMessage { .. } => "chat_message",
        }
    }
}

// ---------------------------------------------------------------------------
// RoomSnapshot
// ---------------------------------------------------------------------------

/// Read-only projection of a room, safe to serialize.
///
/// The password never appears here, only whether one is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub room_name: String,
    pub join_code: String,
    pub max_players: usize,
    pub has_password: bool,
    pub game_mode: GameMode,
    pub difficulty: String,
    pub status: RoomStatus,
    /// Order is not meaningful.
    pub players: Vec<Player>,
    pub selected_song: Option<Song>,
    pub host_id: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// RoomSummary
// ---------------------------------------------------------------------------

/// A compact row used in room listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub room_name: String,
    pub current_players: usize,
    pub max_players: usize,
    pub status: RoomStatus,
    pub has_password: bool,
    pub game_mode: GameMode,
    pub host_name: Option<String>,
    pub created_at: DateTime<Utc>,
}


// ---------------------------------------------------------------------------
// RegistryStats
// ---------------------------------------------------------------------------

/// Aggregate counters across every registered room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_rooms: usize,
    pub total_players: usize,
    pub by_status: HashMap<RoomStatus, usize>,
    pub by_mode: HashMap<GameMode, usize>,
}
