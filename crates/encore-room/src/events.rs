//! Bounded, lossy event queue between a room and its broadcaster.
//!
//! The room is the only producer and must never wait on the consumer, so
//! enqueue is `try_send`: when the queue is full the newest event is
//! dropped and counted. The consumer holds an [`EventStream`] and drains
//! it at its own pace.

use encore_protocol::{RoomEvent, RoomId};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Producer half. Lives inside the room's locked state.
pub(crate) struct EventEmitter {
    room_id: RoomId,
    /// `None` once the room has closed; taken exactly once.
    sender: Option<mpsc::Sender<RoomEvent>>,
    dropped: u64,
}

impl EventEmitter {
    /// Creates an emitter and its matching stream.
    pub(crate) fn channel(room_id: RoomId, capacity: usize) -> (Self, EventStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let emitter = Self {
            room_id: room_id.clone(),
            sender: Some(tx),
            dropped: 0,
        };
        (emitter, EventStream { room_id, receiver: rx })
    }

    /// Enqueues without blocking. Drops the event if the queue is full or
    /// the stream is gone.
    pub(crate) fn emit(&mut self, event: RoomEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped += 1;
                tracing::warn!(
                    room_id = %self.room_id,
                    event = event.kind(),
                    dropped = self.dropped,
                    "event queue full, dropping event"
                );
            }
            Err(TrySendError::Closed(event)) => {
                self.dropped += 1;
                tracing::debug!(
                    room_id = %self.room_id,
                    event = event.kind(),
                    "event stream receiver gone, dropping event"
                );
            }
        }
    }

    /// Moves the sender out. Returns `None` on every call after the first.
    pub(crate) fn take_sender(&mut self) -> Option<mpsc::Sender<RoomEvent>> {
        self.sender.take()
    }

    /// Number of events discarded so far.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Consumer half of a room's event queue.
///
/// Delivers events in emission order (minus any that were dropped).
/// `recv` returns `None` once the room has closed and the queue is drained.
#[derive(Debug)]
pub struct EventStream {
    room_id: RoomId,
    receiver: mpsc::Receiver<RoomEvent>,
}

impl EventStream {
    /// The room this stream belongs to.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Waits for the next event. `None` means the stream is closed.
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        self.receiver.recv().await
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<RoomEvent> {
        self.receiver.try_recv().ok()
    }

    /// Drains everything currently queued without waiting.
    pub fn drain(&mut self) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}
