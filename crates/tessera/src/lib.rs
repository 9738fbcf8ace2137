//! # Tessera
//!
//! Real-time multiplayer session server for turn-based board games.
//!
//! Clients connect over WebSocket, identify with a token, then talk JSON
//! messages. The request path picks what the connection is for:
//!
//! | Path                   | Behavior                                     |
//! |------------------------|----------------------------------------------|
//! | `/gateway`             | notifications only (`Subscribe`)             |
//! | `/lobby/{id}/connect`  | chat lobby: join/leave events, messages      |
//! | `/game/{id}/connect`   | one match: moves, powers, state diffs        |
//!
//! Each layer lives in its own crate and is re-exported here:
//!
//! ```text
//! tessera (router + server loop)
//!   ├─ tessera-lobby / tessera-game   behaviors
//!   ├─ tessera-session                Identify, scopes, heartbeats, hooks
//!   ├─ tessera-notify                 in-process pub/sub
//!   ├─ tessera-store                  repository + in-memory backend
//!   ├─ tessera-protocol               wire messages
//!   └─ tessera-transport              WebSocket connections
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tessera::prelude::*;
//!
//! # async fn start() -> Result<(), TesseraError> {
//! let auth = StaticAuthenticator::new().with_token("secret", "alice");
//! let server = TesseraServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(auth, Arc::new(MemoryRepository::new()))
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod router;
mod server;

pub use error::TesseraError;
pub use router::Route;
pub use server::{TesseraServer, TesseraServerBuilder};

pub use tessera_game as game;
pub use tessera_lobby as lobby;
pub use tessera_notify as notify;
pub use tessera_protocol as protocol;
pub use tessera_session as session;
pub use tessera_store as store;
pub use tessera_transport as transport;

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::{Route, TesseraError, TesseraServer, TesseraServerBuilder};
    pub use tessera_game::{
        Action, GameBehavior, GameConfig, GameSessions, GameState, PowerDefinition,
        PowerDefinitions, SpawnPolicy,
    };
    pub use tessera_lobby::{LobbyBehavior, LobbyRegistry};
    pub use tessera_notify::{Notification, Notifier};
    pub use tessera_protocol::{CloseCode, GameId, LobbyId, Message, UserId};
    pub use tessera_session::{
        Authenticator, GatewayBehavior, RoomBehavior, SessionConfig, SessionError,
        StaticAuthenticator, StoreAuthenticator,
    };
    pub use tessera_store::{Game, MemoryRepository, Repository, User};
}
