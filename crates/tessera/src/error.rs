//! Unified error type for Tessera.

use tessera_game::GameError;
use tessera_lobby::LobbyError;
use tessera_notify::NotifyError;
use tessera_protocol::ProtocolError;
use tessera_session::SessionError;
use tessera_store::StoreError;
use tessera_transport::TransportError;

/// Wraps every layer's error so `?` works across crate boundaries.
#[derive(Debug, thiserror::Error)]
pub enum TesseraError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A session ended with a fatal error.
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error(transparent)]
    Game(#[from] GameError),
}
