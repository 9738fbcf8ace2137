//! Persisted records.
//!
//! These are plain data: the store never interprets them beyond keys,
//! revisions and timestamps. A game's state is kept as opaque JSON so the
//! store does not depend on the rules engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_protocol::{GameId, LobbyId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

impl User {
    pub fn new(id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }

    /// `username (id)`, for log lines.
    pub fn friendly_name(&self) -> String {
        format!("{} ({})", self.username, self.id)
    }
}

/// A persisted match between two players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub player_a_id: UserId,
    pub player_b_id: UserId,
    pub expires_at: DateTime<Utc>,
    /// Bumped by every successful save. A save must carry the revision it
    /// was loaded at.
    pub revision: u64,
    pub state: serde_json::Value,
}

impl Game {
    /// Returns `true` if `user` is one of the two participants.
    pub fn has_player(&self, user: &UserId) -> bool {
        &self.player_a_id == user || &self.player_b_id == user
    }

    /// The participant who is not `player`, or `None` if `player` does not
    /// take part in this game.
    pub fn other_player_id(&self, player: &UserId) -> Option<&UserId> {
        if &self.player_a_id == player {
            Some(&self.player_b_id)
        } else if &self.player_b_id == player {
            Some(&self.player_a_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyMessage {
    pub id: String,
    pub lobby_id: LobbyId,
    pub user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// An issued credential. `accessed_at` is refreshed on every successful
/// lookup through an authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: String,
    pub user_id: UserId,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
}
