//! A live chat lobby.
//!
//! Membership is in memory; messages are persisted through the
//! repository. Every membership change and every message is announced
//! through the [`Notifier`], one notification per member, addressed to
//! that member's user id. Members see them by subscribing (e.g. to
//! `lobby.*`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tessera_notify::{Notification, Notifier};
use tessera_protocol::{LobbyId, UserId};
use tessera_session::SessionHandle;
use tessera_store::{LobbyMessage, Repository, User};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::LobbyError;

pub const TOPIC_JOINED: &str = "lobby.joined";
pub const TOPIC_LEFT: &str = "lobby.left";
pub const TOPIC_MESSAGE_RECEIVED: &str = "lobby.message.received";

/// Most messages a single history page may return.
pub const HISTORY_LIMIT_MAX: usize = 100;

const EVICTION_REASON: &str = "Connected from another location";

struct Member {
    session: SessionHandle,
    user: User,
}

pub struct LobbySession {
    id: LobbyId,
    members: Mutex<HashMap<UserId, Member>>,
    notifier: Notifier,
}

impl LobbySession {
    pub fn new(id: LobbyId, notifier: Notifier) -> Self {
        Self {
            id,
            members: Mutex::new(HashMap::new()),
            notifier,
        }
    }

    pub fn id(&self) -> &LobbyId {
        &self.id
    }

    /// Adds `session` as `user`'s connection to this lobby.
    ///
    /// A previous connection of the same user is kicked first. Every other
    /// member is told about the newcomer.
    pub async fn join(&self, session: &SessionHandle, user: &User) {
        let others = {
            let mut members = self.members.lock().await;
            let previous = members.insert(
                user.id.clone(),
                Member {
                    session: session.clone(),
                    user: user.clone(),
                },
            );
            if let Some(previous) = previous {
                if previous.session != *session {
                    tracing::info!(lobby_id = %self.id, user = %user.friendly_name(), "evicting previous lobby connection");
                    previous.session.kick(EVICTION_REASON);
                }
            }
            other_member_ids(&members, &user.id)
        };
        tracing::info!(lobby_id = %self.id, user = %user.friendly_name(), "joined lobby");

        let data = json!({
            "lobby_id": self.id,
            "user": user_json(user),
        });
        self.announce(TOPIC_JOINED, &others, data).await;
    }

    /// Removes `session` if it is still the one bound for its user.
    ///
    /// A stale session (already replaced by a newer connection of the same
    /// user) is ignored. Returns whether anything was removed.
    pub async fn leave(&self, session: &SessionHandle) -> bool {
        let user_id = session.user_id();
        let remaining = {
            let mut members = self.members.lock().await;
            match members.get(user_id) {
                Some(member) if member.session == *session => {
                    members.remove(user_id);
                }
                _ => return false,
            }
            members.keys().cloned().collect::<Vec<_>>()
        };
        tracing::info!(lobby_id = %self.id, %user_id, "left lobby");

        let data = json!({
            "lobby_id": self.id,
            "user_id": user_id,
        });
        self.announce(TOPIC_LEFT, &remaining, data).await;
        true
    }

    /// Persists a chat message and delivers it to every member, sender
    /// included, before returning.
    pub async fn send_message<R: Repository>(
        &self,
        repository: &R,
        scope: &mut R::Scope,
        user: &User,
        content: &str,
    ) -> Result<LobbyMessage, LobbyError> {
        let message = LobbyMessage {
            id: Uuid::new_v4().to_string(),
            lobby_id: self.id.clone(),
            user_id: user.id.clone(),
            content: content.to_owned(),
            created_at: Utc::now(),
        };
        repository
            .add_lobby_message(scope, message.clone())
            .await?;

        let recipients = self.member_ids().await;
        let data = json!({
            "id": message.id,
            "lobby": { "id": self.id },
            "user": user_json(user),
            "content": message.content,
            "created_at": message.created_at.to_rfc3339(),
        });
        self.announce(TOPIC_MESSAGE_RECEIVED, &recipients, data).await;
        Ok(message)
    }

    /// Whether `user_id` currently has a connection in this lobby.
    pub async fn joined(&self, user_id: &UserId) -> bool {
        self.members.lock().await.contains_key(user_id)
    }

    /// Current members, ordered by user id.
    pub async fn players(&self) -> Vec<User> {
        let members = self.members.lock().await;
        let mut users: Vec<User> =
            members.values().map(|m| m.user.clone()).collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users
    }

    /// Persisted messages, newest first. Only members may read them.
    pub async fn history<R: Repository>(
        &self,
        repository: &R,
        scope: &mut R::Scope,
        user_id: &UserId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<LobbyMessage>, LobbyError> {
        if !self.joined(user_id).await {
            return Err(LobbyError::NotJoined(user_id.clone(), self.id.clone()));
        }
        if limit > HISTORY_LIMIT_MAX {
            return Err(LobbyError::LimitTooHigh {
                limit,
                max: HISTORY_LIMIT_MAX,
            });
        }
        let messages = repository
            .get_lobby_messages(scope, &self.id, before, limit)
            .await?;
        Ok(messages)
    }

    pub async fn member_count(&self) -> usize {
        self.members.lock().await.len()
    }

    async fn member_ids(&self) -> Vec<UserId> {
        self.members.lock().await.keys().cloned().collect()
    }

    async fn announce(&self, topic: &str, recipients: &[UserId], data: Value) {
        for recipient in recipients {
            let notification =
                Notification::new(topic, recipient.as_str(), data.clone());
            self.notifier.publish_now(&notification).await;
        }
    }
}

fn other_member_ids(
    members: &HashMap<UserId, Member>,
    user_id: &UserId,
) -> Vec<UserId> {
    members.keys().filter(|id| *id != user_id).cloned().collect()
}

fn user_json(user: &User) -> Value {
    json!({ "id": user.id, "username": user.username })
}
