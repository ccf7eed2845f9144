//! Room, lifecycle, and registry configuration.

use std::time::Duration;

use encore_protocol::GameMode;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// The attributes a room is created with.
///
/// These never change over the room's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Display name shown in listings.
    pub name: String,

    /// Seats in the room. Reaching this count moves the room to Preparing.
    pub max_players: usize,

    /// Optional join password. Never exposed by snapshots.
    pub password: Option<String>,

    pub game_mode: GameMode,

    /// Free-form difficulty label ("easy", "hard", ...).
    pub difficulty: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            name: "Room".to_string(),
            max_players: 4,
            password: None,
            game_mode: GameMode::Coop,
            difficulty: "normal".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// LifecycleConfig
// ---------------------------------------------------------------------------

/// Timing and buffering knobs shared by every room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Capacity of the bounded event queue. Events beyond this are dropped.
    pub event_capacity: usize,

    /// How long `close` waits to enqueue the final `room_closed` event.
    pub close_timeout: Duration,

    /// Pause between the final event and closing the stream, so a draining
    /// consumer can pick it up.
    pub close_grace: Duration,

    /// Countdown (seconds) announced in `game_starting`.
    pub countdown_secs: u32,

    /// A room older than this is expired regardless of activity.
    pub max_age: Duration,

    /// An empty room idle longer than this is expired.
    pub empty_idle_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            event_capacity: 100,
            close_timeout: Duration::from_millis(100),
            close_grace: Duration::from_millis(10),
            countdown_secs: 3,
            max_age: Duration::from_secs(30 * 60),
            empty_idle_timeout: Duration::from_secs(5 * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Configuration for the [`RoomManager`](crate::RoomManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Smallest capacity a new room may request.
    pub min_players: usize,

    /// Largest capacity a new room may request.
    pub max_players: usize,

    /// How often the cleanup task scans for expired rooms.
    pub cleanup_interval: Duration,

    /// Applied to every room the registry creates.
    pub lifecycle: LifecycleConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 100,
            cleanup_interval: Duration::from_secs(60),
            lifecycle: LifecycleConfig::default(),
        }
    }
}
