//! Room-specific behavior plugged into the generic session.
//!
//! A session handles Identify, Heartbeat and Subscribe itself. Everything
//! else is offered to a [`RoomBehavior`]: the lobby, the game and the
//! gateway each implement it.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tessera_notify::Notifier;
use tessera_protocol::Message;
use tessera_store::{Repository, User};

use crate::{SessionError, SessionHandle};

/// Hooks for one kind of connection.
pub trait RoomBehavior<R: Repository>: Send + 'static {
    /// Runs once, right after `ServerReady` was queued, inside the same
    /// scope that loaded the user.
    fn on_ready(
        &mut self,
        turn: &mut Turn<'_, R>,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Handles one message the session did not handle itself.
    ///
    /// Returns `Ok(false)` if this behavior does not understand the
    /// message; the session then answers with a non-fatal error.
    fn handle_message(
        &mut self,
        turn: &mut Turn<'_, R>,
        message: &Message,
    ) -> impl Future<Output = Result<bool, SessionError>> + Send;
}

/// A behavior that handles nothing beyond the generic messages.
///
/// Gateway connections use this: they exist only to subscribe to
/// notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayBehavior;

impl<R: Repository> RoomBehavior<R> for GatewayBehavior {
    async fn on_ready(&mut self, turn: &mut Turn<'_, R>) -> Result<(), SessionError> {
        tracing::debug!(user_id = %turn.user.id, "gateway ready");
        Ok(())
    }

    async fn handle_message(
        &mut self,
        _turn: &mut Turn<'_, R>,
        _message: &Message,
    ) -> Result<bool, SessionError> {
        Ok(false)
    }
}

/// Everything a behavior may use while handling one message.
///
/// A turn lives for exactly one repository scope. Repository calls go
/// through `turn.repository` with `turn.scope`.
pub struct Turn<'a, R: Repository> {
    /// The session the message arrived on.
    pub session: &'a SessionHandle,
    /// The user, freshly loaded in this scope.
    pub user: &'a User,
    pub repository: &'a R,
    pub scope: &'a mut R::Scope,
    pub notifier: &'a Notifier,
    pub(crate) hooks: &'a mut CloseHooks,
}

impl<R: Repository> Turn<'_, R> {
    /// Registers `hook` to run once when the session ends.
    pub fn on_close<F, Fut>(&mut self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), SessionError>> + Send + 'static,
    {
        self.hooks.push(hook);
    }
}

// ---------------------------------------------------------------------------
// Close hooks
// ---------------------------------------------------------------------------

type CloseHook =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<(), SessionError>> + Send>;

/// Cleanup to run when a session ends. Each hook runs exactly once; a
/// failing or panicking hook does not stop the rest.
#[derive(Default)]
pub struct CloseHooks {
    hooks: Vec<CloseHook>,
}

impl CloseHooks {
    pub fn push<F, Fut>(&mut self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), SessionError>> + Send + 'static,
    {
        self.hooks.push(Box::new(move || hook().boxed()));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook in registration order. Returns how many failed.
    pub async fn run_all(self) -> usize {
        let mut failed = 0;
        for hook in self.hooks {
            let fut = match std::panic::catch_unwind(AssertUnwindSafe(hook)) {
                Ok(fut) => fut,
                Err(_) => {
                    tracing::error!("close hook panicked");
                    failed += 1;
                    continue;
                }
            };
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "close hook failed");
                    failed += 1;
                }
                Err(_) => {
                    tracing::error!("close hook panicked");
                    failed += 1;
                }
            }
        }
        failed
    }
}
