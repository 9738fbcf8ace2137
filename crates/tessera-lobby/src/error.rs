//! Error types for the lobby layer.

use tessera_protocol::{LobbyId, UserId};
use tessera_session::SessionError;
use tessera_store::StoreError;

/// Errors that can occur during lobby operations.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// History was requested by someone who is not in the lobby.
    #[error("user {0} is not inside lobby {1}")]
    NotJoined(UserId, LobbyId),

    /// A history page larger than the lobby allows.
    #[error("limit {limit} too high (max {max})")]
    LimitTooHigh { limit: usize, max: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LobbyError> for SessionError {
    fn from(e: LobbyError) -> Self {
        match e {
            LobbyError::Store(e) => SessionError::Store(e),
            other => SessionError::Internal(other.to_string()),
        }
    }
}
