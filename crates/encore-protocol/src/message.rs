//! Messages exchanged between a client connection and the server.
//!
//! Both directions are internally tagged by `"type"` in snake_case:
//!
//! ```text
//! { "type": "set_ready", "ready": true }
//! { "type": "error", "code": 409, "message": "room is full" }
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    GameMode, PlayerId, RegistryStats, RoomEvent, RoomId, RoomSnapshot, RoomStatus, RoomSummary,
    Song,
};

/// Client → Server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Must be the first frame on a connection.
    Hello {
        player_id: PlayerId,
        player_name: String,
    },

    /// Create a room and take the host seat.
    CreateRoom {
        room_name: String,
        max_players: usize,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        game_mode: GameMode,
        difficulty: String,
    },

    JoinRoom {
        room_id: RoomId,
        #[serde(default)]
        password: Option<String>,
    },

    /// Join using the short human-enterable code.
    JoinByCode {
        join_code: String,
        #[serde(default)]
        password: Option<String>,
    },

    LeaveRoom,

    SetReady {
        ready: bool,
    },

    SelectSong {
        song: Song,
    },

    StartGame,

    EndGame,

    ListRooms {
        #[serde(default)]
        status: Option<RoomStatus>,
        #[serde(default)]
        game_mode: Option<GameMode>,
        #[serde(default = "default_page")]
        page: usize,
        #[serde(default = "default_limit")]
        limit: usize,
    },

    /// Request a fresh snapshot of the caller's current room.
    GetRoom,

    /// Say something to everyone in the caller's room.
    Chat {
        text: String,
    },

    /// Request registry-wide counters.
    Stats,

    Ping {
        client_time: u64,
    },

    Disconnect {
        reason: String,
    },
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    20
}

/// Server → Client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to `hello`.
    Welcome { player_id: PlayerId },

    /// The caller is now seated in `room`.
    RoomJoined { room: RoomSnapshot },

    RoomLeft { room_id: RoomId },

    RoomState { room: RoomSnapshot },

    RoomList {
        rooms: Vec<RoomSummary>,
        total: usize,
        page: usize,
        limit: usize,
    },

    /// A room event fanned out to every connection in the room.
    Event { room_id: RoomId, event: RoomEvent },

    Pong { client_time: u64, server_time: u64 },

    Stats { stats: RegistryStats },

    /// `code` follows HTTP conventions (400, 401, 403, 404, 409).
    Error { code: u16, message: String },
}
