//! Game connections.

use std::sync::Arc;

use tessera_protocol::Message;
use tessera_session::{RoomBehavior, SessionError, Turn};
use tessera_store::Repository;

use crate::rules::Action;
use crate::session::ActionOutcome;
use crate::GameSession;

/// Binds a session to one game: connects on ready, disconnects on close,
/// and turns `Move`/`ApplyPower` into actions.
///
/// The `ActionResult` and every player's diff are queued before the
/// message turn ends.
pub struct GameBehavior {
    game: Arc<GameSession>,
}

impl GameBehavior {
    pub fn new(game: Arc<GameSession>) -> Self {
        Self { game }
    }
}

impl<R: Repository> RoomBehavior<R> for GameBehavior {
    async fn on_ready(&mut self, turn: &mut Turn<'_, R>) -> Result<(), SessionError> {
        self.game
            .connect_player(turn.repository, &mut *turn.scope, turn.session)
            .await?;

        let game = Arc::clone(&self.game);
        let session = turn.session.clone();
        turn.on_close(move || async move {
            game.disconnect_player(&session).await;
            Ok::<(), SessionError>(())
        });
        Ok(())
    }

    async fn handle_message(
        &mut self,
        turn: &mut Turn<'_, R>,
        message: &Message,
    ) -> Result<bool, SessionError> {
        let action = match message {
            Message::Move(data) => Action::Move {
                piece_id: data.piece_id.as_str().into(),
                tile_id: data.tile_id.as_str().into(),
            },
            Message::ApplyPower(data) => Action::ApplyPower {
                power_id: data.power_id.as_str().into(),
            },
            _ => return Ok(false),
        };

        let outcome = self
            .game
            .apply_action(turn.repository, &mut *turn.scope, &turn.user.id, &action)
            .await?;
        turn.session.send(outcome.to_message())?;
        if let ActionOutcome::Applied { game, old, new } = &outcome {
            self.game.broadcast_change(game, old, new).await;
        }
        Ok(true)
    }
}
