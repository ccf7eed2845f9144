/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer went away or the connection was already closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding the listener failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The peer never completed the upgrade, or completed it badly.
    #[error("handshake failed: {0}")]
    HandshakeFailed(#[source] std::io::Error),
}

impl TransportError {
    /// `true` for errors that only affect a single connection attempt.
    ///
    /// An accept loop should log these and keep going.
    pub fn is_per_connection(&self) -> bool {
        matches!(
            self,
            Self::AcceptFailed(_) | Self::HandshakeFailed(_) | Self::ConnectionClosed(_)
        )
    }
}
