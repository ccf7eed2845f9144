//! Error types for the room layer.

use encore_protocol::{PlayerId, RoomId, RoomStatus};

/// Errors returned by room and registry operations.
///
/// Every variant is a synchronous validation outcome: nothing here is
/// retried internally, and the room's state is unchanged whenever one
/// is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The operation is not legal in the room's current status.
    #[error("cannot {operation} while room is {status}")]
    InvalidState {
        operation: &'static str,
        status: RoomStatus,
    },

    /// Every seat is taken.
    #[error("room is full")]
    RoomFull,

    /// The player is already seated in this room.
    #[error("player {0} is already in the room")]
    DuplicatePlayer(PlayerId),

    /// The player is not seated in this room.
    #[error("player {0} is not in the room")]
    PlayerNotFound(PlayerId),

    /// Only the host may do this.
    #[error("player {0} is not the host")]
    NotHost(PlayerId),

    /// Ready-up needs a selected song first.
    #[error("no song has been selected")]
    SongNotSelected,

    /// The game can only start once every player is ready.
    #[error("room is not ready to start (status: {status})")]
    RoomNotReady { status: RoomStatus },

    // -- Registry --

    /// No room with this id is registered.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// No room is registered under this join code.
    #[error("unknown join code {0}")]
    UnknownJoinCode(String),

    /// The supplied password doesn't match the room's.
    #[error("wrong room password")]
    WrongPassword,

    /// A player can sit in at most one room at a time.
    #[error("player {player} is already in room {room}")]
    AlreadyInRoom { player: PlayerId, room: RoomId },

    /// The player is not seated in any room.
    #[error("player {0} is not in any room")]
    NotInRoom(PlayerId),

    /// Requested capacity is outside the allowed range.
    #[error("max players must be between {min} and {max}, got {requested}")]
    InvalidCapacity {
        requested: usize,
        min: usize,
        max: usize,
    },
}

impl RoomError {
    /// Returns `true` for errors caused by the room's current status.
    ///
    /// `RoomNotReady` is the start-game flavour of `InvalidState`.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. } | Self::RoomNotReady { .. })
    }
}
