//! The per-connection state machine.
//!
//! ```text
//! Connecting ─▶ Authenticating ─▶ Ready ⇄ Dispatching ─▶ Closed
//!                     │                                    ▲
//!                     └──────── auth failure ──────────────┘
//! ```
//!
//! One task runs one [`Session`]. It reads inbound frames and drains the
//! session's outbound queue; nothing else writes to the connection.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tessera_notify::{Notification, NotificationSink, Notifier, NotifyError};
use tessera_protocol::{CloseCode, Message, NotificationData, UserId};
use tessera_store::Repository;
use tessera_transport::{Connection, TransportError};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::behavior::{CloseHooks, RoomBehavior, Turn};
use crate::connection::FramedConnection;
use crate::handle::Outbound;
use crate::{Authenticator, SessionError, SessionHandle};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timeouts applied to every session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a new connection may take to send `Identify`.
    ///
    /// Default: 5 seconds.
    pub identify_timeout: Duration,
    /// Longest silence tolerated from an identified client before the
    /// session is closed normally. Clients keep the session alive with
    /// heartbeats.
    ///
    /// Default: 60 seconds.
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identify_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl SessionConfig {
    pub fn identify_timeout(mut self, timeout: Duration) -> Self {
        self.identify_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport accepted, nothing read yet.
    Connecting,
    /// Waiting for `Identify`.
    Authenticating,
    /// Identified; waiting for the next frame or queued output.
    Ready,
    /// Handling one inbound message inside a repository scope.
    Dispatching,
    /// Ended. Close hooks have run or are running.
    Closed,
}

// ---------------------------------------------------------------------------
// SessionServices
// ---------------------------------------------------------------------------

/// Collaborators shared by every session of a server.
pub struct SessionServices<A, R> {
    pub authenticator: A,
    pub repository: Arc<R>,
    pub notifier: Notifier,
    pub config: SessionConfig,
}

impl<A: Authenticator, R: Repository> SessionServices<A, R> {
    pub fn new(authenticator: A, repository: Arc<R>, notifier: Notifier) -> Self {
        Self {
            authenticator,
            repository,
            notifier,
            config: SessionConfig::default(),
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }
}

// ---------------------------------------------------------------------------
// Subscription sink
// ---------------------------------------------------------------------------

/// Forwards notifications into a session's queue as `Notification`
/// messages, tagged with the published topic rather than the pattern.
/// One instance per `Subscribe`.
struct SubscriptionSink {
    session: SessionHandle,
}

impl NotificationSink for SubscriptionSink {
    fn deliver<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            self.session
                .send(Message::Notification(NotificationData {
                    topic: notification.topic.clone(),
                    data: notification.data.clone(),
                }))
                .map_err(|_| NotifyError::ReceiverClosed)
        })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

enum Event {
    Outbound(Outbound),
    Inbound(Result<Option<Message>, SessionError>),
    Idle,
}

/// One connection's lifecycle, from `Identify` to close hooks.
pub struct Session<C, A, R> {
    conn: FramedConnection<C>,
    services: Arc<SessionServices<A, R>>,
    state: SessionState,
}

impl<C, A, R> Session<C, A, R>
where
    C: Connection<Error = TransportError>,
    A: Authenticator,
    R: Repository,
{
    pub fn new(conn: C, services: Arc<SessionServices<A, R>>) -> Self {
        Self {
            conn: FramedConnection::new(conn),
            services,
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the session to completion.
    ///
    /// Returns `Ok(())` when the session ended normally (peer closed,
    /// idle timeout, kicked) and the fatal error otherwise. Close hooks
    /// registered along the way have run by the time this returns.
    pub async fn run<B: RoomBehavior<R>>(mut self, mut behavior: B) -> Result<(), SessionError> {
        let conn_id = self.conn.id();
        let mut hooks = CloseHooks::default();

        self.transition(SessionState::Authenticating);
        let (handle, mut outbound) = match self.handshake(&mut behavior, &mut hooks).await {
            Ok(Some(ready)) => ready,
            Ok(None) => {
                tracing::debug!(%conn_id, "closed before identifying");
                self.transition(SessionState::Closed);
                hooks.run_all().await;
                return Ok(());
            }
            Err(e) => {
                self.fail(&e, None).await;
                self.transition(SessionState::Closed);
                hooks.run_all().await;
                return Err(e);
            }
        };
        tracing::info!(%conn_id, session = %handle.id(), user_id = %handle.user_id(), "session ready");

        let result = self.serve(&handle, &mut outbound, &mut behavior, &mut hooks).await;
        if let Err(e) = &result {
            self.fail(e, Some(&mut outbound)).await;
        }

        self.transition(SessionState::Closed);
        outbound.close();
        let failed_hooks = hooks.run_all().await;
        tracing::info!(
            %conn_id,
            session = %handle.id(),
            user_id = %handle.user_id(),
            failed_hooks,
            "session closed"
        );
        result
    }

    /// Waits for `Identify`, authenticates, loads the user, queues
    /// `ServerReady` and runs the behavior's ready hook.
    ///
    /// `Ok(None)` means the peer went away before identifying.
    async fn handshake<B: RoomBehavior<R>>(
        &mut self,
        behavior: &mut B,
        hooks: &mut CloseHooks,
    ) -> Result<Option<(SessionHandle, mpsc::UnboundedReceiver<Outbound>)>, SessionError> {
        let please_identify = || SessionError::Unauthorized("Please identify yourself".into());

        let timeout = self.services.config.identify_timeout;
        let identify = match tokio::time::timeout(timeout, self.conn.receive_message()).await {
            Err(_) => return Err(please_identify()),
            Ok(Ok(None)) => return Ok(None),
            Ok(Ok(Some(Message::Identify(identify)))) => identify,
            Ok(Ok(Some(_))) => return Err(please_identify()),
            Ok(Err(e)) => return Err(e),
        };
        let user_id = self
            .services
            .authenticator
            .authenticate(&identify.token)
            .await?;

        let repo = &*self.services.repository;
        let mut scope = repo.begin().await?;
        let result = self.ready(user_id, &mut scope, behavior, hooks).await;
        let ready = settle(repo, scope, result).await?;
        self.transition(SessionState::Ready);
        Ok(Some(ready))
    }

    async fn ready<B: RoomBehavior<R>>(
        &self,
        user_id: UserId,
        scope: &mut R::Scope,
        behavior: &mut B,
        hooks: &mut CloseHooks,
    ) -> Result<(SessionHandle, mpsc::UnboundedReceiver<Outbound>), SessionError> {
        let repo = &*self.services.repository;
        let user = repo
            .get_user_by_id(scope, &user_id)
            .await?
            .ok_or_else(|| SessionError::Unauthorized("Auth failed".into()))?;

        let (handle, outbound) = SessionHandle::channel(user_id);
        handle.send(Message::ServerReady)?;

        let mut turn = Turn {
            session: &handle,
            user: &user,
            repository: repo,
            scope,
            notifier: &self.services.notifier,
            hooks,
        };
        behavior.on_ready(&mut turn).await?;
        Ok((handle, outbound))
    }

    /// The READY/DISPATCHING loop. Returns when the session should end.
    async fn serve<B: RoomBehavior<R>>(
        &mut self,
        handle: &SessionHandle,
        outbound: &mut mpsc::UnboundedReceiver<Outbound>,
        behavior: &mut B,
        hooks: &mut CloseHooks,
    ) -> Result<(), SessionError> {
        let idle_timeout = self.services.config.idle_timeout;
        let mut deadline = Instant::now() + idle_timeout;

        loop {
            let event = tokio::select! {
                biased;
                Some(out) = outbound.recv() => Event::Outbound(out),
                inbound = self.conn.receive_frame() => Event::Inbound(inbound),
                _ = tokio::time::sleep_until(deadline) => Event::Idle,
            };

            match event {
                Event::Outbound(Outbound::Message(message)) => {
                    self.conn.send_message(&message).await?;
                }
                Event::Outbound(Outbound::Close { code, reason }) => {
                    tracing::debug!(session = %handle.id(), %code, %reason, "closing on request");
                    if let Err(e) = self.conn.close(code, &reason).await {
                        tracing::debug!(session = %handle.id(), error = %e, "close failed");
                    }
                    return Ok(());
                }
                Event::Idle => {
                    tracing::info!(session = %handle.id(), "idle timeout");
                    let _ = self.conn.close(CloseCode::Normal, "Idle timeout").await;
                    return Ok(());
                }
                Event::Inbound(Ok(None)) => return Ok(()),
                Event::Inbound(Err(e)) if !e.is_fatal() => {
                    deadline = Instant::now() + idle_timeout;
                    self.conn.send_error(&e.client_message(), None).await?;
                }
                Event::Inbound(Err(e)) => return Err(e),
                Event::Inbound(Ok(Some(message))) => {
                    deadline = Instant::now() + idle_timeout;
                    self.transition(SessionState::Dispatching);
                    let result = self.dispatch(handle, message, behavior, hooks).await;
                    self.transition(SessionState::Ready);
                    match result {
                        Ok(()) => {}
                        Err(e) if !e.is_fatal() => {
                            handle.send(Message::error(e.client_message(), false))?;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    /// Handles one inbound message inside its own repository scope.
    async fn dispatch<B: RoomBehavior<R>>(
        &self,
        handle: &SessionHandle,
        message: Message,
        behavior: &mut B,
        hooks: &mut CloseHooks,
    ) -> Result<(), SessionError> {
        let repo = &*self.services.repository;
        let mut scope = repo.begin().await?;
        let result = self
            .dispatch_in_scope(handle, &message, behavior, hooks, &mut scope)
            .await;
        settle(repo, scope, result).await
    }

    async fn dispatch_in_scope<B: RoomBehavior<R>>(
        &self,
        handle: &SessionHandle,
        message: &Message,
        behavior: &mut B,
        hooks: &mut CloseHooks,
        scope: &mut R::Scope,
    ) -> Result<(), SessionError> {
        let repo = &*self.services.repository;
        // User data may have changed since the last message.
        let user = repo
            .get_user_by_id(scope, handle.user_id())
            .await?
            .ok_or_else(|| SessionError::Unauthorized("User no longer exists".into()))?;

        match message {
            Message::Heartbeat => handle.send(Message::Heartbeat),
            Message::Subscribe(subscribe) => {
                self.subscribe(handle, &subscribe.topic, hooks);
                handle.send(Message::Subscribed)
            }
            other => {
                let mut turn = Turn {
                    session: handle,
                    user: &user,
                    repository: repo,
                    scope,
                    notifier: &self.services.notifier,
                    hooks,
                };
                if !behavior.handle_message(&mut turn, other).await? {
                    tracing::debug!(session = %handle.id(), opcode = ?other.opcode(), "unexpected opcode");
                    handle.send(Message::error("Unexpected opcode", false))?;
                }
                Ok(())
            }
        }
    }

    fn subscribe(&self, handle: &SessionHandle, topic: &str, hooks: &mut CloseHooks) {
        let notifier = self.services.notifier.clone();
        let sink = Arc::new(SubscriptionSink {
            session: handle.clone(),
        });
        let id = notifier.register_handler(handle.user_id().as_str(), topic, sink);
        tracing::debug!(session = %handle.id(), %topic, "subscribed");
        hooks.push(move || async move {
            notifier.unregister_handler(id);
            Ok::<(), SessionError>(())
        });
    }

    /// Reports a fatal error to the peer and closes the connection.
    ///
    /// Output queued before the failure is written first, up to the first
    /// queued close.
    async fn fail(
        &self,
        error: &SessionError,
        outbound: Option<&mut mpsc::UnboundedReceiver<Outbound>>,
    ) {
        match error {
            SessionError::Unauthorized(_) | SessionError::Conflict(_) | SessionError::NotFound(_) => {
                tracing::info!(conn_id = %self.conn.id(), error = %error, "session rejected");
            }
            SessionError::Closed | SessionError::Transport(_) => {
                tracing::debug!(conn_id = %self.conn.id(), error = %error, "connection lost");
            }
            _ => {
                tracing::error!(conn_id = %self.conn.id(), error = %error, "session failed");
            }
        }

        let Some(code) = error.close_code() else {
            return;
        };
        if let Some(outbound) = outbound {
            while let Ok(out) = outbound.try_recv() {
                match out {
                    Outbound::Message(message) => {
                        if self.conn.send_message(&message).await.is_err() {
                            return;
                        }
                    }
                    Outbound::Close { .. } => break,
                }
            }
        }
        if let Err(e) = self.conn.send_error(&error.client_message(), Some(code)).await {
            tracing::debug!(conn_id = %self.conn.id(), error = %e, "could not report error");
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!(conn_id = %self.conn.id(), from = ?self.state, to = ?next, "session state");
        self.state = next;
    }
}

/// Commits `scope` when `result` is `Ok` and rolls it back otherwise.
async fn settle<R: Repository, T>(
    repo: &R,
    scope: R::Scope,
    result: Result<T, SessionError>,
) -> Result<T, SessionError> {
    match result {
        Ok(value) => {
            repo.commit(scope).await?;
            Ok(value)
        }
        Err(e) => {
            repo.rollback(scope).await;
            Err(e)
        }
    }
}
