//! Error types for the game layer.
//!
//! Rule violations are not errors: they come back as
//! [`ActionOutcome::Illegal`](crate::ActionOutcome::Illegal).

use tessera_protocol::{GameId, UserId};
use tessera_session::SessionError;
use tessera_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// No persisted game with this id.
    #[error("game {0} not found")]
    NotFound(GameId),

    /// The user does not play in this game.
    #[error("user {user} is not part of game {game}")]
    NotParticipant { user: UserId, game: GameId },

    /// The persisted state could not be read back.
    #[error("game {game} has a corrupt state: {source}")]
    CorruptState {
        game: GameId,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<GameError> for SessionError {
    fn from(e: GameError) -> Self {
        match e {
            GameError::NotFound(_) => SessionError::NotFound(e.to_string()),
            GameError::NotParticipant { .. } => {
                SessionError::Unauthorized(e.to_string())
            }
            GameError::Store(e) => SessionError::Store(e),
            GameError::CorruptState { .. } => SessionError::Internal(e.to_string()),
        }
    }
}
