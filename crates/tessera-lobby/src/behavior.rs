//! Lobby connections.

use std::sync::Arc;

use tessera_protocol::Message;
use tessera_session::{RoomBehavior, SessionError, Turn};
use tessera_store::Repository;

use crate::LobbySession;

/// Binds a session to one lobby: joins on ready, leaves on close and
/// relays `SendMessage`.
pub struct LobbyBehavior {
    lobby: Arc<LobbySession>,
}

impl LobbyBehavior {
    pub fn new(lobby: Arc<LobbySession>) -> Self {
        Self { lobby }
    }
}

impl<R: Repository> RoomBehavior<R> for LobbyBehavior {
    async fn on_ready(&mut self, turn: &mut Turn<'_, R>) -> Result<(), SessionError> {
        self.lobby.join(turn.session, turn.user).await;

        let lobby = Arc::clone(&self.lobby);
        let session = turn.session.clone();
        turn.on_close(move || async move {
            lobby.leave(&session).await;
            Ok::<(), SessionError>(())
        });
        Ok(())
    }

    async fn handle_message(
        &mut self,
        turn: &mut Turn<'_, R>,
        message: &Message,
    ) -> Result<bool, SessionError> {
        let Message::SendMessage(data) = message else {
            return Ok(false);
        };
        self.lobby
            .send_message(turn.repository, &mut *turn.scope, turn.user, &data.content)
            .await?;
        Ok(true)
    }
}
