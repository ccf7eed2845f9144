//! Unified error type for the Encore server.

use encore_protocol::ProtocolError;
use encore_room::RoomError;
use encore_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum EncoreError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room or registry refused an operation.
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl EncoreError {
    /// HTTP-style code sent to the client in an `error` message.
    pub fn code(&self) -> u16 {
        match self {
            Self::Room(e) => room_error_code(e),
            Self::Protocol(_) => 400,
            Self::Transport(_) => 500,
        }
    }
}

/// Maps a room failure onto the code reported over the wire.
pub fn room_error_code(err: &RoomError) -> u16 {
    match err {
        RoomError::InvalidState { .. }
        | RoomError::RoomNotReady { .. }
        | RoomError::SongNotSelected
        | RoomError::InvalidCapacity { .. } => 400,
        RoomError::WrongPassword => 401,
        RoomError::NotHost(_) => 403,
        RoomError::NotFound(_)
        | RoomError::UnknownJoinCode(_)
        | RoomError::PlayerNotFound(_)
        | RoomError::NotInRoom(_) => 404,
        RoomError::RoomFull | RoomError::DuplicatePlayer(_) | RoomError::AlreadyInRoom { .. } => {
            409
        }
    }
}
