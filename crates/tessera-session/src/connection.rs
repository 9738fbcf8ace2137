//! Message-level view of a transport connection.
//!
//! [`FramedConnection`] turns raw frames into [`Message`]s and back. It
//! knows nothing about users, lobbies or games.

use tessera_protocol::{CloseCode, Message};
use tessera_transport::{Connection, ConnectionId, Frame, TransportError};

use crate::SessionError;

pub struct FramedConnection<C> {
    inner: C,
}

impl<C: Connection<Error = TransportError>> FramedConnection<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id()
    }

    /// The request path the connection was opened with.
    pub fn path(&self) -> &str {
        self.inner.path()
    }

    /// Receives and decodes one frame.
    ///
    /// Returns `Ok(None)` once the peer closed the connection or the
    /// transport failed. Undecodable or binary frames come back as
    /// non-fatal errors; the caller decides whether to report them.
    pub async fn receive_frame(&self) -> Result<Option<Message>, SessionError> {
        let frame = match self.inner.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::debug!(conn_id = %self.id(), error = %e, "recv failed");
                return Ok(None);
            }
        };
        match frame {
            Frame::Text(text) => Ok(Some(Message::from_text(&text)?)),
            Frame::Binary(_) => Err(SessionError::UnexpectedFrame),
        }
    }

    /// Receives the next well-formed message.
    ///
    /// Malformed frames are answered with a non-fatal `Error` and skipped.
    pub async fn receive_message(&self) -> Result<Option<Message>, SessionError> {
        loop {
            match self.receive_frame().await {
                Err(e) if !e.is_fatal() => {
                    self.send_error(&e.client_message(), None).await?;
                }
                other => return other,
            }
        }
    }

    pub async fn send_message(&self, message: &Message) -> Result<(), SessionError> {
        let text = message.to_text()?;
        self.inner.send_text(&text).await?;
        Ok(())
    }

    /// Sends an `Error` message. With a close code the error is fatal and
    /// the connection is closed right after, using the message as reason.
    pub async fn send_error(
        &self,
        message: &str,
        close_code: Option<CloseCode>,
    ) -> Result<(), SessionError> {
        self.send_message(&Message::error(message, close_code.is_some()))
            .await?;
        if let Some(code) = close_code {
            self.close(code, message).await?;
        }
        Ok(())
    }

    pub async fn close(&self, code: CloseCode, reason: &str) -> Result<(), SessionError> {
        self.inner.close(code.code(), reason).await?;
        Ok(())
    }
}
