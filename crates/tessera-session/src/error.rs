//! Error types for the session layer.
//!
//! Each variant belongs to one class of failure and knows how it is shown
//! to the peer: non-fatal errors are echoed and the session continues,
//! fatal ones end the session (and, where a close code applies, close the
//! connection with it).

use tessera_protocol::{CloseCode, ProtocolError};
use tessera_store::StoreError;
use tessera_transport::TransportError;

/// Errors that can occur while a session is running.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The peer sent something that could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The peer sent a frame type the protocol does not use.
    #[error("Unexpected message type")]
    UnexpectedFrame,

    /// Missing or rejected credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// The same user connected again elsewhere.
    #[error("{0}")]
    Conflict(String),

    /// The room or game the connection targets does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The session handle's connection is gone.
    #[error("session closed")]
    Closed,

    /// The underlying connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The repository failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Anything else. Ends the session.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Returns `false` only for errors the session survives.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Protocol(p) if p.is_malformed())
            && !matches!(self, Self::UnexpectedFrame)
    }

    /// The close code to use when this error ends the session, or `None`
    /// if the connection is already unusable or the error is not fatal.
    pub fn close_code(&self) -> Option<CloseCode> {
        if !self.is_fatal() {
            return None;
        }
        match self {
            Self::Unauthorized(_) => Some(CloseCode::Unauthorized),
            Self::Conflict(_) => Some(CloseCode::Conflict),
            Self::Closed | Self::Transport(_) => None,
            _ => Some(CloseCode::Normal),
        }
    }

    /// The text put in the `Error` message sent to the peer.
    ///
    /// Internal failures are not described to the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::Store(_)
            | Self::Internal(_)
            | Self::Protocol(ProtocolError::Encode(_)) => {
                "Internal server error".to_owned()
            }
            other => other.to_string(),
        }
    }
}
