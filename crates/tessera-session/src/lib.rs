//! Session layer for Tessera.
//!
//! A session is one authenticated connection. This crate provides:
//!
//! 1. **Authentication**: the [`Authenticator`] trait and two
//!    implementations.
//! 2. **Framing**: [`FramedConnection`] turns transport frames into
//!    protocol messages.
//! 3. **The state machine**: [`Session`] runs Identify, the per-message
//!    repository scope, heartbeats, subscriptions and close hooks, and
//!    hands everything else to a [`RoomBehavior`].
//! 4. **Handles**: [`SessionHandle`] lets other tasks queue messages,
//!    close or kick a session without touching its connection.
//!
//! # Subscriptions
//!
//! `Subscribe` takes a topic pattern (`*` and `prefix.*` are accepted).
//! Every notification a subscription forwards carries the **concrete**
//! topic it was published under, not the pattern the client subscribed
//! with: a `lobby.*` subscriber sees `lobby.joined`. Clients written
//! against servers that echo the pattern back must switch on the
//! concrete topic instead. Overlapping subscriptions are independent,
//! so a notification matching two of them is forwarded twice.
//!
//! # How it fits in the stack
//!
//! ```text
//! Lobby / Game / Gateway behaviors (above)
//!     ↕
//! Session layer (this crate)  ← identity, ordering, transactions, cleanup
//!     ↕
//! Protocol + Transport (below)
//! ```

mod auth;
mod behavior;
mod connection;
mod error;
mod handle;
mod session;

pub use auth::{Authenticator, StaticAuthenticator, StoreAuthenticator};
pub use behavior::{CloseHooks, GatewayBehavior, RoomBehavior, Turn};
pub use connection::FramedConnection;
pub use error::SessionError;
pub use handle::{Outbound, SessionHandle, SessionId};
pub use session::{Session, SessionConfig, SessionServices, SessionState};
