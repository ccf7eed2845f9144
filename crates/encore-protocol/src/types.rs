//! Core value types shared by every Encore layer.
//!
//! Identities, the song catalogue entry, game modes, the room lifecycle
//! status, and the public player record. Everything here is plain data:
//! it can be cloned, compared, and serialized to the wire.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// Newtype over `String` so a `PlayerId` can never be passed where a
/// `RoomId` is expected. `#[serde(transparent)]` keeps the JSON form a
/// plain string: `"alice"`, not `{"0": "alice"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Creates a player id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A unique identifier for a room.
///
/// Generated by the registry as `room_<16 hex chars>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Creates a room id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Song
// ---------------------------------------------------------------------------

/// A song the host can pick for the next round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    #[serde(rename = "song_id")]
    pub id: String,
    #[serde(rename = "song_name")]
    pub name: String,
    pub difficulty: String,
    /// Length of the track in seconds.
    #[serde(rename = "duration")]
    pub duration_secs: u32,
}

// ---------------------------------------------------------------------------
// GameMode
// ---------------------------------------------------------------------------

/// How players in a room compete (or don't).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Everyone plays towards a shared score.
    #[default]
    Coop,
    /// Head-to-head scoring.
    Versus,
    /// No scoring, just practice.
    Practice,
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coop => write!(f, "coop"),
            Self::Versus => write!(f, "versus"),
            Self::Practice => write!(f, "practice"),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// The lifecycle status of a room.
///
/// ```text
/// Waiting ⇄ Preparing → Ready → Playing → Finished
///    └──────────┴─────────┴────────┴─────────┴──→ Closed
/// ```
///
/// Ending the game is unconditional, so every non-terminal status also has
/// an edge to `Finished`.
///
/// - **Waiting**: accepting players, not yet at capacity.
/// - **Preparing**: room is full; the host picks a song, players ready up.
///   Late joins are still allowed while a seat is free.
/// - **Ready**: everyone is ready on the selected song; the host may start.
/// - **Playing**: the round is running.
/// - **Finished**: the round has ended.
/// - **Closed**: terminal. No further mutation, event stream closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Preparing,
    Ready,
    Playing,
    Finished,
    Closed,
}

impl RoomStatus {
    /// Returns `true` if players may join in this status.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting | Self::Preparing)
    }

    /// Returns `true` once the room can never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if `target` is reachable in one legal step.
    ///
    /// Any non-terminal status may be closed or finished. `Closed` reaches
    /// nothing.
    pub fn can_transition_to(self, target: Self) -> bool {
        use RoomStatus::*;
        match (self, target) {
            (Closed, _) => false,
            (_, Closed) | (_, Finished) => true,
            (Waiting, Preparing)
            | (Preparing, Waiting)
            | (Preparing, Ready)
            | (Ready, Playing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Playing => "playing",
            Self::Finished => "finished",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// Public view of a player seated in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    #[serde(rename = "player_id")]
    pub id: PlayerId,
    #[serde(rename = "player_name")]
    pub name: String,
    pub is_host: bool,
    pub is_ready: bool,
    pub joined_at: DateTime<Utc>,
}
