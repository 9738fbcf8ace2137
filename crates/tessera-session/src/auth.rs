//! Authentication hook for the Identify handshake.
//!
//! Tessera does not issue credentials. It defines the [`Authenticator`]
//! trait: one async method that turns the token from an `Identify`
//! message into a [`UserId`], or rejects it. Two implementations ship
//! with the crate:
//!
//! - [`StaticAuthenticator`]: a fixed token table, for tests and local
//!   development.
//! - [`StoreAuthenticator`]: resolves tokens through the repository's
//!   access-token records and refreshes their `accessed_at`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tessera_protocol::UserId;
use tessera_store::{AccessToken, Repository};

use crate::SessionError;

/// Validates a client's token and returns who they are.
///
/// # Example
///
/// ```rust
/// use tessera_protocol::UserId;
/// use tessera_session::{Authenticator, SessionError};
///
/// /// Treats the token itself as the user id. Development only.
/// struct TrustingAuthenticator;
///
/// impl Authenticator for TrustingAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<UserId, SessionError> {
///         if token.is_empty() {
///             return Err(SessionError::Unauthorized("Auth failed".into()));
///         }
///         Ok(UserId::from(token))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the user the token belongs to.
    ///
    /// # Errors
    /// [`SessionError::Unauthorized`] for unknown or expired tokens. Other
    /// errors (e.g. a failing store) end the session as internal errors.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<UserId, SessionError>> + Send;
}

fn rejected() -> SessionError {
    SessionError::Unauthorized("Auth failed".into())
}

// ---------------------------------------------------------------------------
// StaticAuthenticator
// ---------------------------------------------------------------------------

/// Accepts a fixed set of tokens.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    tokens: HashMap<String, UserId>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `token` as a credential for `user`.
    pub fn with_token(
        mut self,
        token: impl Into<String>,
        user: impl Into<UserId>,
    ) -> Self {
        self.tokens.insert(token.into(), user.into());
        self
    }
}

impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<UserId, SessionError> {
        self.tokens.get(token).cloned().ok_or_else(rejected)
    }
}

// ---------------------------------------------------------------------------
// StoreAuthenticator
// ---------------------------------------------------------------------------

/// Resolves tokens through [`Repository::get_access_token`].
///
/// A token unused for longer than `max_idle` is rejected. Every accepted
/// lookup writes the token back with a fresh `accessed_at`.
pub struct StoreAuthenticator<R> {
    repository: Arc<R>,
    max_idle: Option<Duration>,
}

impl<R: Repository> StoreAuthenticator<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            max_idle: None,
        }
    }

    /// Rejects tokens whose last use is older than `max_idle`.
    pub fn max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = Some(max_idle);
        self
    }
}

impl<R: Repository> Authenticator for StoreAuthenticator<R> {
    async fn authenticate(&self, token: &str) -> Result<UserId, SessionError> {
        let repo = &*self.repository;
        let mut scope = repo.begin().await?;
        let found = match repo.get_access_token(&mut scope, token).await {
            Ok(found) => found,
            Err(e) => {
                repo.rollback(scope).await;
                return Err(e.into());
            }
        };

        let now = Utc::now();
        let Some(stored) = found else {
            repo.rollback(scope).await;
            return Err(rejected());
        };
        let idle = self
            .max_idle
            .is_some_and(|max_idle| stored.accessed_at + max_idle < now);
        if idle {
            tracing::debug!(user_id = %stored.user_id, "access token idle too long");
            repo.rollback(scope).await;
            return Err(rejected());
        }

        let user_id = stored.user_id.clone();
        let refreshed = AccessToken {
            accessed_at: now,
            ..stored
        };
        if let Err(e) = repo.add_access_token(&mut scope, refreshed).await {
            repo.rollback(scope).await;
            return Err(e.into());
        }
        repo.commit(scope).await?;
        Ok(user_id)
    }
}
