//! Cloneable handle to a running session.
//!
//! Other tasks (a lobby broadcasting, a game fanning out a diff, the
//! notifier forwarding an event) never touch the connection directly. They
//! push [`Outbound`] items into the session's queue and the session task
//! writes them in order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tessera_protocol::{CloseCode, Message, UserId};
use tokio::sync::mpsc;

use crate::SessionError;

/// Unique per session, never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Work queued for the session task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(Message),
    /// Close the connection and end the session.
    Close { code: CloseCode, reason: String },
}

/// Handle to one authenticated session. Equality is by session id.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    user_id: UserId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SessionHandle {
    pub fn new(
        user_id: UserId,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            id: SessionId::next(),
            user_id,
            outbound,
        }
    }

    /// A handle whose queue is the returned receiver. Used by the session
    /// task itself and by tests that stand in for a connection.
    pub fn channel(user_id: UserId) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(user_id, tx), rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Queues a message.
    ///
    /// # Errors
    /// [`SessionError::Closed`] if the session already ended.
    pub fn send(&self, message: Message) -> Result<(), SessionError> {
        self.outbound
            .send(Outbound::Message(message))
            .map_err(|_| SessionError::Closed)
    }

    /// Queues a close. Messages queued before it are still delivered.
    pub fn close(
        &self,
        code: CloseCode,
        reason: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.outbound
            .send(Outbound::Close {
                code,
                reason: reason.into(),
            })
            .map_err(|_| SessionError::Closed)
    }

    /// Evicts the session because the same user connected elsewhere: a
    /// `Kick` message, then a close with [`CloseCode::Conflict`].
    pub fn kick(&self, reason: &str) {
        tracing::info!(session = %self.id, user_id = %self.user_id, %reason, "kicking session");
        // A session that already ended has nothing left to evict.
        let _ = self.send(Message::kick(reason));
        let _ = self.close(CloseCode::Conflict, reason);
    }

    /// Returns `true` once the session task stopped reading its queue.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SessionHandle {}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .finish()
    }
}
