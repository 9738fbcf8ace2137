//! Persistence contract for Tessera.
//!
//! The server core never talks to a database directly. It consumes a
//! [`Repository`]: a handful of get/add/save operations, all executed
//! against an explicit [`Repository::Scope`] handle that demarcates one
//! transaction.
//!
//! ```text
//! begin() ──▶ scope ──▶ get/add/save(&mut scope, ..) ──▶ commit(scope)
//!                                                    └─▶ rollback(scope)
//! ```
//!
//! Sessions open exactly one scope per inbound message (and one for the
//! ready handshake) and never hold it across waiting for the next frame.
//!
//! [`MemoryRepository`] is a complete in-process implementation with
//! optimistic revision checking, used by tests and the dev server.

mod error;
mod memory;
mod records;

use std::future::Future;

use chrono::{DateTime, Utc};
use tessera_protocol::{GameId, LobbyId, UserId};

pub use error::StoreError;
pub use memory::{MemoryRepository, MemoryScope};
pub use records::{AccessToken, Game, LobbyMessage, User};

/// Storage operations the session layer depends on.
///
/// Writes made through a scope become visible to other scopes only after
/// [`commit`](Repository::commit). Reads through a scope see that scope's
/// own uncommitted writes.
pub trait Repository: Send + Sync + 'static {
    /// One open transaction.
    type Scope: Send;

    fn begin(
        &self,
    ) -> impl Future<Output = Result<Self::Scope, StoreError>> + Send;

    /// Makes every write in `scope` visible atomically.
    ///
    /// # Errors
    /// [`StoreError::Conflict`] if a game saved in this scope was saved by
    /// another scope in the meantime. Nothing is applied in that case.
    fn commit(
        &self,
        scope: Self::Scope,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Discards every write in `scope`.
    fn rollback(&self, scope: Self::Scope) -> impl Future<Output = ()> + Send;

    // -- users ------------------------------------------------------------

    fn get_user_by_id(
        &self,
        scope: &mut Self::Scope,
        id: &UserId,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    fn add_user(
        &self,
        scope: &mut Self::Scope,
        user: User,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    // -- games ------------------------------------------------------------

    fn get_game_by_id(
        &self,
        scope: &mut Self::Scope,
        id: &GameId,
    ) -> impl Future<Output = Result<Option<Game>, StoreError>> + Send;

    fn add_game(
        &self,
        scope: &mut Self::Scope,
        game: Game,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Saves `game`, which must carry the revision it was loaded at.
    /// Returns the stored record with its new revision.
    fn save_game(
        &self,
        scope: &mut Self::Scope,
        game: Game,
    ) -> impl Future<Output = Result<Game, StoreError>> + Send;

    // -- lobbies ----------------------------------------------------------

    fn add_lobby_message(
        &self,
        scope: &mut Self::Scope,
        message: LobbyMessage,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Messages of `lobby` created strictly before `before` (or all, if
    /// `None`), newest first, at most `limit` of them.
    fn get_lobby_messages(
        &self,
        scope: &mut Self::Scope,
        lobby: &LobbyId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<LobbyMessage>, StoreError>> + Send;

    // -- access tokens ----------------------------------------------------

    /// Inserts a token, or replaces the one with the same `token` value.
    fn add_access_token(
        &self,
        scope: &mut Self::Scope,
        token: AccessToken,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_access_token(
        &self,
        scope: &mut Self::Scope,
        token: &str,
    ) -> impl Future<Output = Result<Option<AccessToken>, StoreError>> + Send;
}
