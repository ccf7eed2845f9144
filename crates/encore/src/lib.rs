//! # Encore
//!
//! Real-time room server for multiplayer rhythm games.
//!
//! Players connect over WebSocket, say `hello`, and then create or join
//! rooms, pick a song, ready up, and play. Each room is a state machine
//! from [`encore_room`]; this crate wires it to the network:
//!
//! ```text
//! WebSocket ─→ handler ─→ RoomManager / Room ─→ EventStream ─→ Hub ─→ every connection in the room
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use encore::prelude::*;
//!
//! # async fn start() -> Result<(), EncoreError> {
//! let server = EncoreServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .registry_config(RegistryConfig::default())
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod hub;
mod server;

pub use error::{EncoreError, room_error_code};
pub use hub::{Eviction, Hub, Outbound};
pub use server::{EncoreServer, EncoreServerBuilder, ServerConfig};

pub mod prelude {
    pub use crate::{EncoreError, EncoreServer, EncoreServerBuilder, ServerConfig};
    pub use encore_protocol::{
        ClientMessage, GameMode, Player, PlayerId, RegistryStats, RoomEvent, RoomId, RoomSnapshot,
        RoomStatus, RoomSummary, ServerMessage, Song,
    };
    pub use encore_room::{LifecycleConfig, RegistryConfig, RoomConfig, RoomError, RoomManager};
}
