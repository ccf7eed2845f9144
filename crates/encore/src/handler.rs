//! Per-connection handler: handshake, command routing, and teardown.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   0. Finish the WebSocket upgrade within the handshake timeout
//!   1. Receive `hello` → reply `welcome`, evicting any older connection
//!      for the same player
//!   2. Spawn a writer task that drains the connection's outbound queue
//!   3. Loop: receive commands → run them against the registry or room
//!   4. On exit: leave the hub; the player stays seated in their room

use std::sync::Arc;

use chrono::Utc;
use encore_protocol::{
    ClientMessage, Codec, PlayerId, ProtocolError, RoomEvent, RoomId, RoomSnapshot, ServerMessage,
};
use encore_room::{Room, RoomConfig, RoomError, RoomFilter};
use encore_transport::{
    Connection, Incoming, IncomingWebSocket, TransportError, WebSocketConnection,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::EncoreError;
use crate::hub::{Eviction, Outbound};
use crate::server::ServerState;

/// What the message loop should do after a command.
enum Flow {
    Continue,
    Close,
}

/// One greeted player on one connection.
struct Session {
    player_id: PlayerId,
    player_name: String,
    outbound: Outbound,
    /// Room whose hub audience this connection is part of.
    listening: Option<RoomId>,
}

impl Session {
    async fn reply(&self, msg: ServerMessage) -> Result<(), EncoreError> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| TransportError::ConnectionClosed("writer task ended".into()).into())
    }

    async fn send_error(&self, code: u16, message: impl Into<String>) -> Result<(), EncoreError> {
        self.reply(ServerMessage::Error {
            code,
            message: message.into(),
        })
        .await
    }

    /// Joins the hub audience for `room`, leaving any previous one.
    ///
    /// Starts the room's forwarder if nobody has yet, which covers rooms
    /// created directly through the registry.
    async fn listen<C: Codec>(&mut self, state: &ServerState<C>, room: &Room) {
        self.stop_listening(state).await;
        if !state.hub.is_attached(room.id()).await && !state.hub.attach(room).await {
            tracing::warn!(
                room_id = %room.id(),
                player_id = %self.player_id,
                "room events are consumed elsewhere, player gets no broadcasts"
            );
        }
        state
            .hub
            .register(room.id(), self.player_id.clone(), self.outbound.clone())
            .await;
        self.listening = Some(room.id().clone());
    }

    async fn stop_listening<C: Codec>(&mut self, state: &ServerState<C>) {
        if let Some(room_id) = self.listening.take() {
            state
                .hub
                .unregister(&room_id, &self.player_id, &self.outbound)
                .await;
        }
    }

    /// The room this player is seated in.
    async fn current_room<C: Codec>(&self, state: &ServerState<C>) -> Result<Arc<Room>, RoomError> {
        state
            .registry
            .player_room(&self.player_id)
            .await
            .ok_or_else(|| RoomError::NotInRoom(self.player_id.clone()))
    }
}

/// Completes the upgrade off the accept loop, then hands over to
/// [`handle_connection`].
pub(crate) async fn handle_incoming<C: Codec>(
    incoming: IncomingWebSocket,
    state: Arc<ServerState<C>>,
) -> Result<(), EncoreError> {
    let peer = incoming.peer_addr();
    let conn = match tokio::time::timeout(state.config.handshake_timeout, incoming.upgrade()).await
    {
        Ok(upgraded) => upgraded?,
        Err(_) => {
            tracing::debug!(%peer, "WebSocket upgrade timed out");
            return Err(TransportError::HandshakeFailed(std::io::ErrorKind::TimedOut.into()).into());
        }
    };
    handle_connection(conn, state).await
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), EncoreError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    // --- Step 1: Handshake ---
    let (player_id, player_name) = match perform_handshake(&conn, &state).await {
        Ok(greeting) => greeting,
        Err(e) => {
            let _ = conn.close().await;
            return Err(e);
        }
    };
    tracing::info!(%conn_id, %player_id, %player_name, "player connected");
    let mut evicted = state.hub.claim(&player_id, conn_id).await;

    // --- Step 2: Writer ---
    let (outbound, rx) = mpsc::channel(state.config.outbound_capacity.max(1));
    let writer = spawn_writer(Arc::clone(&conn), Arc::clone(&state), rx);

    let mut session = Session {
        player_id,
        player_name,
        outbound,
        listening: None,
    };
    session
        .reply(ServerMessage::Welcome {
            player_id: session.player_id.clone(),
        })
        .await?;

    // A player who dropped off without leaving picks their room back up.
    if let Some(room) = state.registry.player_room(&session.player_id).await {
        session.listen(&state, &room).await;
        session
            .reply(ServerMessage::RoomState {
                room: room.snapshot().await,
            })
            .await?;
    }

    // --- Step 3: Message loop ---
    let result = message_loop(&conn, &state, &mut session, &mut evicted).await;

    // --- Step 4: Teardown ---
    session.stop_listening(&state).await;
    state.hub.release(&session.player_id, conn_id).await;
    tracing::info!(%conn_id, player_id = %session.player_id, "player disconnected");
    drop(session);
    let _ = writer.await;
    result
}

/// Receives `hello` and replies `welcome`. Anything else is refused.
async fn perform_handshake<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
) -> Result<(PlayerId, String), EncoreError> {
    let data = match tokio::time::timeout(state.config.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before hello".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(EncoreError::Transport(e)),
        Err(_) => {
            send_direct(conn, &state.codec, 400, "hello timed out").await?;
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    match state.codec.decode::<ClientMessage>(&data) {
        Ok(ClientMessage::Hello {
            player_id,
            player_name,
        }) if !player_id.as_str().is_empty() => Ok((player_id, player_name)),
        _ => {
            send_direct(conn, &state.codec, 400, "first message must be hello").await?;
            Err(ProtocolError::InvalidMessage("first message must be hello".into()).into())
        }
    }
}

/// Reads frames until the client leaves, goes idle, the socket fails, or a
/// newer connection takes over the player.
async fn message_loop<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
    session: &mut Session,
    evicted: &mut Eviction,
) -> Result<(), EncoreError> {
    let player_id = session.player_id.clone();
    loop {
        let received = tokio::select! {
            _ = &mut *evicted => {
                tracing::info!(%player_id, "replaced by a newer connection");
                session.send_error(409, "connected from another session").await?;
                return Ok(());
            }
            received = tokio::time::timeout(state.config.idle_timeout, conn.recv()) => received,
        };
        let data = match received {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%player_id, "connection closed cleanly");
                return Ok(());
            }
            Ok(Err(e)) => {
                tracing::debug!(%player_id, error = %e, "recv error");
                return Err(e.into());
            }
            Err(_) => {
                tracing::info!(%player_id, "connection idle, dropping");
                return Ok(());
            }
        };

        let msg: ClientMessage = match state.codec.decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%player_id, error = %e, "failed to decode message");
                session.send_error(400, format!("invalid message: {e}")).await?;
                continue;
            }
        };

        match handle_command(state, session, msg).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Close) => return Ok(()),
            Err(EncoreError::Transport(e)) => return Err(e.into()),
            Err(e) => {
                tracing::debug!(%player_id, error = %e, "command refused");
                session.send_error(e.code(), e.to_string()).await?;
            }
        }
    }
}

/// Runs one client command.
async fn handle_command<C: Codec>(
    state: &ServerState<C>,
    session: &mut Session,
    msg: ClientMessage,
) -> Result<Flow, EncoreError> {
    let player_id = session.player_id.clone();

    match msg {
        ClientMessage::Hello { .. } => {
            session.send_error(400, "already greeted").await?;
        }

        ClientMessage::CreateRoom {
            room_name,
            max_players,
            password,
            game_mode,
            difficulty,
        } => {
            if let Some(current) = state.registry.player_room(&player_id).await {
                return Err(RoomError::AlreadyInRoom {
                    player: player_id,
                    room: current.id().clone(),
                }
                .into());
            }
            let room = state
                .registry
                .create_room(RoomConfig {
                    name: room_name,
                    max_players,
                    password: password.clone(),
                    game_mode,
                    difficulty,
                })
                .await?;
            // Before the join, so the forwarder sees `player_joined`.
            state.hub.attach(&room).await;

            let joined = state
                .registry
                .join_room(
                    room.id(),
                    player_id,
                    &session.player_name,
                    password.as_deref(),
                )
                .await;
            if let Err(e) = joined {
                // Nobody else knows about the room yet.
                let _ = state.registry.close_room(room.id(), "creation_failed").await;
                return Err(e.into());
            }
            enter_room(state, session, &room).await?;
        }

        ClientMessage::JoinRoom { room_id, password } => {
            let room = state
                .registry
                .join_room(
                    &room_id,
                    player_id,
                    &session.player_name,
                    password.as_deref(),
                )
                .await?;
            enter_room(state, session, &room).await?;
        }

        ClientMessage::JoinByCode {
            join_code,
            password,
        } => {
            let room_id = state.registry.find_by_join_code(&join_code).await?.id().clone();
            let room = state
                .registry
                .join_room(
                    &room_id,
                    player_id,
                    &session.player_name,
                    password.as_deref(),
                )
                .await?;
            enter_room(state, session, &room).await?;
        }

        ClientMessage::LeaveRoom => {
            let room_id = state.registry.leave_room(&player_id).await?;
            session.stop_listening(state).await;
            session.reply(ServerMessage::RoomLeft { room_id }).await?;
        }

        ClientMessage::SetReady { ready } => {
            session.current_room(state).await?.set_ready(&player_id, ready).await?;
        }

        ClientMessage::SelectSong { song } => {
            session.current_room(state).await?.select_song(&player_id, song).await?;
        }

        ClientMessage::StartGame => {
            session.current_room(state).await?.start_game(&player_id).await?;
        }

        ClientMessage::EndGame => {
            session.current_room(state).await?.end_game().await?;
        }

        ClientMessage::ListRooms {
            status,
            game_mode,
            page,
            limit,
        } => {
            let page = page.max(1);
            let limit = limit.clamp(1, 100);
            let filter = RoomFilter { status, game_mode };
            let (rooms, total) = state.registry.list_rooms(&filter, page, limit).await;
            session
                .reply(ServerMessage::RoomList {
                    rooms,
                    total,
                    page,
                    limit,
                })
                .await?;
        }

        ClientMessage::GetRoom => {
            let room = session.current_room(state).await?.snapshot().await;
            session.reply(ServerMessage::RoomState { room }).await?;
        }

        ClientMessage::Chat { text } => {
            let room = session.current_room(state).await?;
            let event = RoomEvent::ChatMessage {
                player_id,
                text,
                timestamp: Utc::now().timestamp(),
            };
            state
                .hub
                .broadcast(
                    room.id(),
                    ServerMessage::Event {
                        room_id: room.id().clone(),
                        event,
                    },
                )
                .await;
        }

        ClientMessage::Stats => {
            let stats = state.registry.stats().await;
            session.reply(ServerMessage::Stats { stats }).await?;
        }

        ClientMessage::Ping { client_time } => {
            let server_time = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
            session
                .reply(ServerMessage::Pong {
                    client_time,
                    server_time,
                })
                .await?;
        }

        ClientMessage::Disconnect { reason } => {
            tracing::info!(%player_id, %reason, "client disconnected");
            return Ok(Flow::Close);
        }
    }

    Ok(Flow::Continue)
}

/// Subscribes the session to a room it just joined and sends the snapshot.
async fn enter_room<C: Codec>(
    state: &ServerState<C>,
    session: &mut Session,
    room: &Room,
) -> Result<(), EncoreError> {
    session.listen(state, room).await;
    let snapshot: RoomSnapshot = room.snapshot().await;
    session.reply(ServerMessage::RoomJoined { room: snapshot }).await
}

/// Drains the outbound queue onto the socket, then closes it.
fn spawn_writer<C: Codec>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<C>>,
    mut rx: mpsc::Receiver<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let conn_id = conn.id();
        while let Some(msg) = rx.recv().await {
            let bytes = match state.codec.encode(&msg) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(%conn_id, error = %e, "failed to encode outbound message");
                    continue;
                }
            };
            if let Err(e) = conn.send(&bytes).await {
                tracing::debug!(%conn_id, error = %e, "send failed, stopping writer");
                break;
            }
        }
        let _ = conn.close().await;
    })
}

/// Sends an `error` straight to the socket, bypassing the outbound queue.
///
/// Only used before the writer task exists.
async fn send_direct(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    code: u16,
    message: &str,
) -> Result<(), EncoreError> {
    let bytes = codec.encode(&ServerMessage::Error {
        code,
        message: message.to_string(),
    })?;
    conn.send(&bytes).await?;
    Ok(())
}
