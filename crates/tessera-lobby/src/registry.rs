//! Registry of live lobbies.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_notify::Notifier;
use tessera_protocol::LobbyId;
use tokio::sync::Mutex;

use crate::LobbySession;

/// Creates lobbies on first use and hands out shared references to them.
///
/// Lobbies are never torn down: an empty lobby costs one map entry.
pub struct LobbyRegistry {
    lobbies: Mutex<HashMap<LobbyId, Arc<LobbySession>>>,
    notifier: Notifier,
}

impl LobbyRegistry {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            lobbies: Mutex::new(HashMap::new()),
            notifier,
        }
    }

    /// Returns the lobby for `id`, creating it if needed.
    pub async fn get_or_create(&self, id: &LobbyId) -> Arc<LobbySession> {
        let mut lobbies = self.lobbies.lock().await;
        if let Some(lobby) = lobbies.get(id) {
            return Arc::clone(lobby);
        }
        let lobby = Arc::new(LobbySession::new(id.clone(), self.notifier.clone()));
        lobbies.insert(id.clone(), Arc::clone(&lobby));
        tracing::info!(lobby_id = %id, "lobby created");
        lobby
    }

    pub async fn get(&self, id: &LobbyId) -> Option<Arc<LobbySession>> {
        self.lobbies.lock().await.get(id).cloned()
    }

    pub async fn lobby_count(&self) -> usize {
        self.lobbies.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_returns_same_instance() {
        let registry = LobbyRegistry::new(Notifier::new());
        let id = LobbyId::from("@main");
        assert!(registry.get(&id).await.is_none());

        let a = registry.get_or_create(&id).await;
        let b = registry.get_or_create(&id).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.lobby_count().await, 1);

        let other = registry.get_or_create(&LobbyId::from("@side")).await;
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(registry.lobby_count().await, 2);
    }
}
