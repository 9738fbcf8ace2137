/// Errors raised while listening, upgrading or moving frames.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer went away; carries the underlying cause.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The listener could not be bound.
    #[error("could not bind {addr}: {source}")]
    BindFailed {
        addr: String,
        source: std::io::Error,
    },

    /// Accepting a TCP stream failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The client connected but the WebSocket upgrade did not complete.
    #[error("upgrade from {peer} failed: {reason}")]
    UpgradeFailed { peer: String, reason: String },

    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Returns `true` when the error means the peer is gone rather than
    /// a local failure.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_) | Self::Shutdown)
    }
}
