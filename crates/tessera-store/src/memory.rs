//! In-process [`Repository`] implementation.
//!
//! Writes are staged in the [`MemoryScope`] and applied under one lock at
//! commit time. The same checks run when a write is staged and again at
//! commit; only the commit-time result is authoritative.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tessera_protocol::{GameId, LobbyId, UserId};

use crate::{AccessToken, Game, LobbyMessage, Repository, StoreError, User};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    games: HashMap<GameId, Game>,
    lobby_messages: Vec<LobbyMessage>,
    access_tokens: HashMap<String, AccessToken>,
}

#[derive(Debug, Clone)]
enum Write {
    AddUser(User),
    AddGame(Game),
    /// `game.revision` is already the new revision.
    SaveGame { game: Game, expected: u64 },
    AddLobbyMessage(LobbyMessage),
    PutAccessToken(AccessToken),
}

/// Open transaction against a [`MemoryRepository`].
#[derive(Debug)]
pub struct MemoryScope {
    id: u64,
    writes: Vec<Write>,
}

impl MemoryScope {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of staged writes.
    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    fn staged_user(&self, id: &UserId) -> Option<&User> {
        self.writes.iter().rev().find_map(|w| match w {
            Write::AddUser(u) if &u.id == id => Some(u),
            _ => None,
        })
    }

    fn staged_game(&self, id: &GameId) -> Option<&Game> {
        self.writes.iter().rev().find_map(|w| match w {
            Write::AddGame(g) | Write::SaveGame { game: g, .. }
                if &g.id == id =>
            {
                Some(g)
            }
            _ => None,
        })
    }

    fn staged_token(&self, token: &str) -> Option<&AccessToken> {
        self.writes.iter().rev().find_map(|w| match w {
            Write::PutAccessToken(t) if t.token == token => Some(t),
            _ => None,
        })
    }
}

/// Thread-safe in-memory store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    tables: Arc<Mutex<Tables>>,
    next_scope: Arc<AtomicU64>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stages `write` unless the scope would already fail to commit.
    fn stage(&self, scope: &mut MemoryScope, write: Write) -> Result<(), StoreError> {
        scope.writes.push(write);
        let checked = validate(&self.tables(), &scope.writes);
        if checked.is_err() {
            scope.writes.pop();
        }
        checked
    }
}

/// Checks every staged write against `tables` without applying anything.
fn validate(tables: &Tables, writes: &[Write]) -> Result<(), StoreError> {
    let mut revisions: HashMap<&GameId, u64> = HashMap::new();
    let mut added_users: Vec<&UserId> = Vec::new();
    for write in writes {
        match write {
            Write::AddUser(u) => {
                if tables.users.contains_key(&u.id) || added_users.contains(&&u.id)
                {
                    return Err(StoreError::Duplicate {
                        kind: "user",
                        id: u.id.to_string(),
                    });
                }
                added_users.push(&u.id);
            }
            Write::AddGame(g) => {
                if tables.games.contains_key(&g.id)
                    || revisions.contains_key(&g.id)
                {
                    return Err(StoreError::Duplicate {
                        kind: "game",
                        id: g.id.to_string(),
                    });
                }
                revisions.insert(&g.id, g.revision);
            }
            Write::SaveGame { game, expected } => {
                let found = revisions
                    .get(&game.id)
                    .copied()
                    .or_else(|| tables.games.get(&game.id).map(|g| g.revision))
                    .ok_or_else(|| StoreError::NotFound {
                        kind: "game",
                        id: game.id.to_string(),
                    })?;
                if found != *expected {
                    return Err(StoreError::Conflict {
                        kind: "game",
                        id: game.id.to_string(),
                        expected: *expected,
                        found,
                    });
                }
                revisions.insert(&game.id, game.revision);
            }
            Write::AddLobbyMessage(_) | Write::PutAccessToken(_) => {}
        }
    }
    Ok(())
}

fn apply(tables: &mut Tables, writes: Vec<Write>) {
    for write in writes {
        match write {
            Write::AddUser(u) => {
                tables.users.insert(u.id.clone(), u);
            }
            Write::AddGame(g) | Write::SaveGame { game: g, .. } => {
                tables.games.insert(g.id.clone(), g);
            }
            Write::AddLobbyMessage(m) => tables.lobby_messages.push(m),
            Write::PutAccessToken(t) => {
                tables.access_tokens.insert(t.token.clone(), t);
            }
        }
    }
}

impl Repository for MemoryRepository {
    type Scope = MemoryScope;

    async fn begin(&self) -> Result<MemoryScope, StoreError> {
        let id = self.next_scope.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(MemoryScope {
            id,
            writes: Vec::new(),
        })
    }

    async fn commit(&self, scope: MemoryScope) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if let Err(e) = validate(&tables, &scope.writes) {
            tracing::warn!(scope = scope.id, error = %e, "commit rejected");
            return Err(e);
        }
        let count = scope.writes.len();
        apply(&mut tables, scope.writes);
        if count > 0 {
            tracing::trace!(scope = scope.id, writes = count, "committed");
        }
        Ok(())
    }

    async fn rollback(&self, scope: MemoryScope) {
        if !scope.writes.is_empty() {
            tracing::debug!(
                scope = scope.id,
                writes = scope.writes.len(),
                "rolled back"
            );
        }
    }

    async fn get_user_by_id(
        &self,
        scope: &mut MemoryScope,
        id: &UserId,
    ) -> Result<Option<User>, StoreError> {
        if let Some(user) = scope.staged_user(id) {
            return Ok(Some(user.clone()));
        }
        Ok(self.tables().users.get(id).cloned())
    }

    async fn add_user(
        &self,
        scope: &mut MemoryScope,
        user: User,
    ) -> Result<(), StoreError> {
        self.stage(scope, Write::AddUser(user))
    }

    async fn get_game_by_id(
        &self,
        scope: &mut MemoryScope,
        id: &GameId,
    ) -> Result<Option<Game>, StoreError> {
        if let Some(game) = scope.staged_game(id) {
            return Ok(Some(game.clone()));
        }
        Ok(self.tables().games.get(id).cloned())
    }

    async fn add_game(
        &self,
        scope: &mut MemoryScope,
        game: Game,
    ) -> Result<(), StoreError> {
        self.stage(scope, Write::AddGame(game))
    }

    async fn save_game(
        &self,
        scope: &mut MemoryScope,
        mut game: Game,
    ) -> Result<Game, StoreError> {
        let expected = game.revision;
        game.revision += 1;
        self.stage(
            scope,
            Write::SaveGame {
                game: game.clone(),
                expected,
            },
        )?;
        Ok(game)
    }

    async fn add_lobby_message(
        &self,
        scope: &mut MemoryScope,
        message: LobbyMessage,
    ) -> Result<(), StoreError> {
        scope.writes.push(Write::AddLobbyMessage(message));
        Ok(())
    }

    async fn get_lobby_messages(
        &self,
        scope: &mut MemoryScope,
        lobby: &LobbyId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<LobbyMessage>, StoreError> {
        let staged = scope.writes.iter().filter_map(|w| match w {
            Write::AddLobbyMessage(m) => Some(m.clone()),
            _ => None,
        });
        let mut messages: Vec<LobbyMessage> = self
            .tables()
            .lobby_messages
            .iter()
            .cloned()
            .chain(staged)
            .filter(|m| &m.lobby_id == lobby)
            .filter(|m| before.is_none_or(|b| m.created_at < b))
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn add_access_token(
        &self,
        scope: &mut MemoryScope,
        token: AccessToken,
    ) -> Result<(), StoreError> {
        scope.writes.push(Write::PutAccessToken(token));
        Ok(())
    }

    async fn get_access_token(
        &self,
        scope: &mut MemoryScope,
        token: &str,
    ) -> Result<Option<AccessToken>, StoreError> {
        if let Some(t) = scope.staged_token(token) {
            return Ok(Some(t.clone()));
        }
        Ok(self.tables().access_tokens.get(token).cloned())
    }
}
