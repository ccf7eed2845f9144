//! `EncoreServer` builder and server loop.
//!
//! This is the entry point for running an Encore room server. It ties
//! together all the layers: transport → protocol → room registry → hub.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use encore_protocol::{Codec, JsonCodec};
use encore_room::{RegistryConfig, RoomManager};
use encore_transport::{Transport, WebSocketTransport};
use serde::{Deserialize, Serialize};

use crate::EncoreError;
use crate::handler::handle_incoming;
use crate::hub::Hub;

/// Per-connection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// How long a new connection has to finish the WebSocket upgrade, and
    /// then again to send `hello`.
    pub handshake_timeout: Duration,

    /// A connection that sends nothing for this long is dropped.
    pub idle_timeout: Duration,

    /// Capacity of each connection's outbound queue. Broadcasts to a full
    /// queue are dropped.
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            outbound_capacity: 256,
        }
    }
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: Arc<RoomManager>,
    pub(crate) hub: Arc<Hub>,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting an Encore server.
///
/// # Example
///
/// ```rust,no_run
/// use encore::prelude::*;
///
/// # async fn start() -> Result<(), EncoreError> {
/// let server = EncoreServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct EncoreServerBuilder {
    bind_addr: String,
    registry_config: RegistryConfig,
    server_config: ServerConfig,
}

impl EncoreServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            registry_config: RegistryConfig::default(),
            server_config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets capacity limits, room timings, and the cleanup interval.
    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    /// Sets per-connection timeouts and queue sizes.
    pub fn server_config(mut self, config: ServerConfig) -> Self {
        self.server_config = config;
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<EncoreServer<JsonCodec>, EncoreError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: Arc::new(RoomManager::new(self.registry_config)),
            hub: Arc::new(Hub::new()),
            codec: JsonCodec,
            config: self.server_config,
        });

        Ok(EncoreServer { transport, state })
    }
}

impl Default for EncoreServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Encore server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct EncoreServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl EncoreServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> EncoreServerBuilder {
        EncoreServerBuilder::new()
    }
}

impl<C: Codec> EncoreServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, EncoreError> {
        Ok(self.transport.local_addr()?)
    }

    /// The room registry, for inspection and administration.
    pub fn registry(&self) -> Arc<RoomManager> {
        Arc::clone(&self.state.registry)
    }

    /// Runs the server until the process is terminated.
    pub async fn run(self) -> Result<(), EncoreError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop and the expiry scan until `shutdown` resolves,
    /// then closes every room with reason `server_shutdown`.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), EncoreError> {
        let cleanup = self.state.registry.spawn_cleanup();
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Encore server running");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(incoming) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_incoming(incoming, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) if e.is_per_connection() => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                        // Listener-level failure. Back off before retrying.
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        tracing::info!("shutting down");
        cleanup.stop().await;
        self.state.registry.shutdown().await;
        Ok(())
    }
}
