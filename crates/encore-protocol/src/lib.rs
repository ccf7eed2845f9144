//! Wire protocol for Encore.
//!
//! This crate defines everything that leaves a room or crosses a socket:
//!
//! - **Types** ([`PlayerId`], [`RoomId`], [`Song`], [`GameMode`],
//!   [`RoomStatus`], [`Player`]) shared by every layer.
//! - **Room output** ([`RoomEvent`], [`RoomSnapshot`], [`RoomSummary`],
//!   [`RegistryStats`]), produced by rooms and the registry and consumed by
//!   broadcasters and listings.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]) spoken over a
//!   connection.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) turning messages into bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (messages) → Room (state machine)
//! ```

mod codec;
mod error;
mod message;
mod room;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{ClientMessage, ServerMessage};
pub use room::{RegistryStats, RoomEvent, RoomSnapshot, RoomSummary};
pub use types::{GameMode, Player, PlayerId, RoomId, RoomStatus, Song};
