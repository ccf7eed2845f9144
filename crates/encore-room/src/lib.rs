//! Room lifecycle management for Encore.
//!
//! A [`Room`] is a single in-memory state machine guarded by one
//! reader–writer lock. It serializes player actions (join, leave, ready,
//! song selection, start, end), enforces the lifecycle
//!
//! ```text
//! Waiting ⇄ Preparing → Ready → Playing → Finished   (any → Closed)
//! ```
//!
//! and emits a bounded, lossy stream of [`RoomEvent`](encore_protocol::RoomEvent)s
//! for a broadcaster to fan out.
//!
//! # Key types
//!
//! - [`Room`]: the state machine itself
//! - [`EventStream`]: consumer end of a room's event queue
//! - [`RoomManager`]: creates rooms, indexes them, reclaims expired ones
//! - [`RoomConfig`], [`LifecycleConfig`], [`RegistryConfig`]: settings
//! - [`RoomError`]: every way an operation can be refused

mod config;
mod error;
mod events;
mod manager;
mod room;

pub use config::{LifecycleConfig, RegistryConfig, RoomConfig};
pub use error::RoomError;
pub use events::EventStream;
pub use encore_protocol::RegistryStats;
pub use manager::{CleanupTask, RoomFilter, RoomManager};
pub use room::Room;
