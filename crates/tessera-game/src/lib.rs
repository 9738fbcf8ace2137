//! Turn-based game engine for Tessera.
//!
//! Two players move pieces across a board of tiles with elevations.
//! Stepping onto an occupied square captures whatever stands there;
//! stepping onto a loose power picks it up for later use.
//!
//! # Key types
//!
//! - [`GameState`]: the authoritative board, persisted as JSON
//! - [`apply_action`]: validation and effects of one [`Action`]
//! - [`PowerDefinitions`]: catalogue of power kinds
//! - [`SpawnPolicy`]: when new powers appear
//! - [`sync`]: per-viewer snapshots, etags and diffs
//! - [`GameSession`] / [`GameSessions`]: live matches and their players
//! - [`GameBehavior`]: plugs a game into a session

mod behavior;
mod error;
mod model;
mod powers;
mod registry;
mod rules;
mod session;
mod spawn;
pub mod sync;

pub use behavior::GameBehavior;
pub use error::GameError;
pub use model::{
    BoardSize, GameBoard, GameConfig, GameSettings, GameState, Piece,
    PieceId, Position, Power, PowerId, PowerSpawn, Tile, TileId,
    STARTING_ROWS,
};
pub use powers::{PowerDefinition, PowerDefinitions, RaiseTile};
pub use registry::GameSessions;
pub use rules::{Action, IllegalAction, Rules, apply_action};
pub use session::{ActionOutcome, GameSession, TOPIC_STATE_CHANGED};
pub use spawn::{CountdownSpawn, NoSpawn, SpawnPolicy};
