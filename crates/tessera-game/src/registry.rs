//! Live game sessions by game id.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_notify::Notifier;
use tessera_protocol::GameId;
use tokio::sync::Mutex;

use crate::GameSession;
use crate::powers::PowerDefinitions;
use crate::spawn::{CountdownSpawn, SpawnPolicy};

type SpawnFactory = Arc<dyn Fn(&GameId) -> Box<dyn SpawnPolicy> + Send + Sync>;

/// Creates a [`GameSession`] on the first connection attempt and keeps it
/// until [`GameSessions::evict`] drops it.
pub struct GameSessions {
    sessions: Mutex<HashMap<GameId, Arc<GameSession>>>,
    notifier: Notifier,
    powers: Arc<PowerDefinitions>,
    spawn: SpawnFactory,
}

impl GameSessions {
    /// Built-in powers and [`CountdownSpawn`] seeded from the OS.
    pub fn new(notifier: Notifier) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            notifier,
            powers: Arc::new(PowerDefinitions::builtin()),
            spawn: Arc::new(|_: &GameId| -> Box<dyn SpawnPolicy> {
                Box::new(CountdownSpawn::new())
            }),
        }
    }

    pub fn powers(mut self, powers: PowerDefinitions) -> Self {
        self.powers = Arc::new(powers);
        self
    }

    /// Sets how each new session gets its spawn policy.
    pub fn spawn_policy<F>(mut self, factory: F) -> Self
    where
        F: Fn(&GameId) -> Box<dyn SpawnPolicy> + Send + Sync + 'static,
    {
        self.spawn = Arc::new(factory);
        self
    }

    pub fn power_definitions(&self) -> &PowerDefinitions {
        &self.powers
    }

    pub async fn get_or_create(&self, id: &GameId) -> Arc<GameSession> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(id) {
            return Arc::clone(session);
        }
        let session = Arc::new(GameSession::new(
            id.clone(),
            Arc::clone(&self.powers),
            (self.spawn)(id),
            self.notifier.clone(),
        ));
        sessions.insert(id.clone(), Arc::clone(&session));
        tracing::info!(game_id = %id, "game session created");
        session
    }

    pub async fn get(&self, id: &GameId) -> Option<Arc<GameSession>> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// Drops the session for `id` if no player is bound to it and nobody
    /// else still holds it (e.g. a connection midway through `Identify`).
    pub async fn evict(&self, id: &GameId) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get(id) else {
            return false;
        };
        if Arc::strong_count(session) > 1 || session.connected_count().await > 0 {
            return false;
        }
        sessions.remove(id);
        tracing::info!(game_id = %id, "game session evicted");
        true
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
