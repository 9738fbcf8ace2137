//! One live match: player bindings and the action protocol.
//!
//! The persisted [`Game`] is the source of truth. Every action reloads it
//! inside the caller's repository scope, works on a copy of its state and
//! saves the result, so a concurrent writer shows up as a revision
//! conflict from the store.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tessera_notify::{Notification, Notifier};
use tessera_protocol::{GameId, GameStateData, GameStateDiffData, Message, UserId};
use tessera_session::SessionHandle;
use tessera_store::{Game, Repository};
use tokio::sync::Mutex;

use crate::GameError;
use crate::model::GameState;
use crate::powers::PowerDefinitions;
use crate::rules::{Action, IllegalAction, Rules, apply_action};
use crate::spawn::SpawnPolicy;
use crate::sync::{StateDiff, snapshot_for};

pub const TOPIC_STATE_CHANGED: &str = "game.state.changed";

const EVICTION_REASON: &str = "Connected from another location";

/// Result of [`GameSession::apply_action`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The action was refused; nothing changed.
    Illegal { reason: IllegalAction },
    /// The action took effect. `game` is the saved record.
    Applied {
        game: Game,
        old: GameState,
        new: GameState,
    },
}

impl ActionOutcome {
    pub fn is_legal(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// The `ActionResult` message reporting this outcome.
    pub fn to_message(&self) -> Message {
        match self {
            Self::Illegal { reason } => {
                Message::action_result(false, Some(reason.reason().to_owned()))
            }
            Self::Applied { .. } => Message::action_result(true, None),
        }
    }
}

pub struct GameSession {
    game_id: GameId,
    players: Mutex<HashMap<UserId, SessionHandle>>,
    powers: Arc<PowerDefinitions>,
    spawn: Mutex<Box<dyn SpawnPolicy>>,
    notifier: Notifier,
}

impl GameSession {
    pub fn new(
        game_id: GameId,
        powers: Arc<PowerDefinitions>,
        spawn: Box<dyn SpawnPolicy>,
        notifier: Notifier,
    ) -> Self {
        Self {
            game_id,
            players: Mutex::new(HashMap::new()),
            powers,
            spawn: Mutex::new(spawn),
            notifier,
        }
    }

    pub fn id(&self) -> &GameId {
        &self.game_id
    }

    /// Loads the persisted game and decodes its state.
    pub async fn load<R: Repository>(
        &self,
        repository: &R,
        scope: &mut R::Scope,
    ) -> Result<(Game, GameState), GameError> {
        let game = repository
            .get_game_by_id(scope, &self.game_id)
            .await?
            .ok_or_else(|| GameError::NotFound(self.game_id.clone()))?;
        let state = GameState::from_value(&game.state).map_err(|source| {
            GameError::CorruptState {
                game: self.game_id.clone(),
                source,
            }
        })?;
        Ok((game, state))
    }

    // -----------------------------------------------------------------------
    // Player bindings
    // -----------------------------------------------------------------------

    /// Binds `session` as its user's connection and sends it the full state.
    ///
    /// An older connection of the same player is kicked first. The user must
    /// be one of the two participants.
    pub async fn connect_player<R: Repository>(
        &self,
        repository: &R,
        scope: &mut R::Scope,
        session: &SessionHandle,
    ) -> Result<(), GameError> {
        let (game, state) = self.load(repository, scope).await?;
        let user_id = session.user_id();
        if !game.has_player(user_id) {
            return Err(GameError::NotParticipant {
                user: user_id.clone(),
                game: self.game_id.clone(),
            });
        }

        let previous = self
            .players
            .lock()
            .await
            .insert(user_id.clone(), session.clone());
        if let Some(previous) = previous {
            if previous != *session {
                tracing::info!(game_id = %self.game_id, %user_id, "evicting previous game connection");
                previous.kick(EVICTION_REASON);
            }
        }
        tracing::info!(game_id = %self.game_id, %user_id, session = %session.id(), "player connected");

        let (game_state, etag) = snapshot_for(&state, user_id);
        let message = Message::GameState(GameStateData {
            recipient_id: user_id.clone(),
            game_state,
            etag,
        });
        if let Err(e) = session.send(message) {
            tracing::warn!(game_id = %self.game_id, %user_id, error = %e, "initial state not delivered");
        }
        Ok(())
    }

    /// Unbinds `session` if it is still the current one for its user.
    pub async fn disconnect_player(&self, session: &SessionHandle) -> bool {
        let user_id = session.user_id();
        let mut players = self.players.lock().await;
        match players.get(user_id) {
            Some(bound) if bound == session => {
                players.remove(user_id);
                tracing::info!(game_id = %self.game_id, %user_id, "player disconnected");
                true
            }
            _ => false,
        }
    }

    pub async fn is_player_connected(&self, user_id: &UserId) -> bool {
        self.players.lock().await.contains_key(user_id)
    }

    pub async fn connected_count(&self) -> usize {
        self.players.lock().await.len()
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Validates `action` by `actor` and, if legal, saves the new state in
    /// `scope`. Nothing is sent to anyone; see [`Self::broadcast_change`].
    pub async fn apply_action<R: Repository>(
        &self,
        repository: &R,
        scope: &mut R::Scope,
        actor: &UserId,
        action: &Action,
    ) -> Result<ActionOutcome, GameError> {
        let (mut game, old) = self.load(repository, scope).await?;
        let Some(opponent) = game.other_player_id(actor).cloned() else {
            return Err(GameError::NotParticipant {
                user: actor.clone(),
                game: self.game_id.clone(),
            });
        };

        let mut new = old.clone();
        let verdict = {
            let mut spawn = self.spawn.lock().await;
            let mut rules = Rules {
                powers: &self.powers,
                spawn: &mut **spawn,
            };
            apply_action(&mut new, actor, &opponent, action, &mut rules)
        };
        if let Err(reason) = verdict {
            tracing::debug!(game_id = %self.game_id, %actor, %reason, "illegal action");
            return Ok(ActionOutcome::Illegal { reason });
        }

        game.state = new.to_value().map_err(|source| GameError::CorruptState {
            game: self.game_id.clone(),
            source,
        })?;
        let game = match repository.save_game(scope, game).await {
            Ok(game) => game,
            Err(e) => {
                if e.is_conflict() {
                    tracing::warn!(game_id = %self.game_id, error = %e, "concurrent game update");
                }
                return Err(e.into());
            }
        };
        Ok(ActionOutcome::Applied { game, old, new })
    }

    /// Sends every connected player their own diff from `old` to `new`, then
    /// announces the change to both participants.
    ///
    /// Diffs are queued on the player sessions before this returns. A
    /// closed session does not stop delivery to the others.
    pub async fn broadcast_change(&self, game: &Game, old: &GameState, new: &GameState) {
        let players: Vec<SessionHandle> =
            self.players.lock().await.values().cloned().collect();
        for session in &players {
            let viewer = session.user_id();
            let change = StateDiff::between(old, new, viewer);
            let message = Message::GameStateDiff(GameStateDiffData {
                recipient_id: viewer.clone(),
                game_state_diff: change.diff,
                etag_from: change.etag_from,
                etag_to: change.etag_to,
            });
            if let Err(e) = session.send(message) {
                tracing::warn!(game_id = %self.game_id, %viewer, error = %e, "diff not delivered");
            }
        }

        for participant in [&game.player_a_id, &game.player_b_id] {
            let (_, etag_from) = snapshot_for(old, participant);
            let (_, etag_to) = snapshot_for(new, participant);
            self.notifier.publish(Notification::new(
                TOPIC_STATE_CHANGED,
                participant.as_str(),
                json!({
                    "game_id": self.game_id,
                    "etag_from": etag_from,
                    "etag_to": etag_to,
                }),
            ));
        }
    }

    // -----------------------------------------------------------------------
    // Polling
    // -----------------------------------------------------------------------

    /// Current state as `viewer` sees it, with its etag.
    pub async fn snapshot_for<R: Repository>(
        &self,
        repository: &R,
        scope: &mut R::Scope,
        viewer: &UserId,
    ) -> Result<(Value, String), GameError> {
        let (_, state) = self.load(repository, scope).await?;
        Ok(snapshot_for(&state, viewer))
    }

    /// Like [`Self::snapshot_for`], but `None` if `etag` is still current.
    pub async fn snapshot_if_changed<R: Repository>(
        &self,
        repository: &R,
        scope: &mut R::Scope,
        viewer: &UserId,
        etag: &str,
    ) -> Result<Option<(Value, String)>, GameError> {
        let snapshot = self.snapshot_for(repository, scope, viewer).await?;
        Ok((snapshot.1 != etag).then_some(snapshot))
    }
}
