//! Chat lobbies for Tessera.
//!
//! A lobby is a named room where connected users exchange chat messages.
//! One user has at most one live connection per lobby: joining again from
//! elsewhere kicks the older connection.
//!
//! # Key types
//!
//! - [`LobbySession`]: membership, message persistence and broadcast
//! - [`LobbyRegistry`]: lobbies by id, created on first use
//! - [`LobbyBehavior`]: plugs a lobby into a session

mod behavior;
mod error;
mod lobby;
mod registry;

pub use behavior::LobbyBehavior;
pub use error::LobbyError;
pub use lobby::{
    HISTORY_LIMIT_MAX, LobbySession, TOPIC_JOINED, TOPIC_LEFT,
    TOPIC_MESSAGE_RECEIVED,
};
pub use registry::LobbyRegistry;
