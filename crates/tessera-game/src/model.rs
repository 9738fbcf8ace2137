//! Game state: tiles, pieces, powers and whose turn it is.
//!
//! This is the authoritative, persisted shape. What a given player is
//! allowed to see is produced by [`crate::sync::serialize_for`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_protocol::UserId;
use uuid::Uuid;

macro_rules! board_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// A fresh random id.
            pub fn random() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

board_id!(TileId);
board_id!(PieceId);
board_id!(PowerId);

/// Rows each player starts with, counted from their own edge.
pub const STARTING_ROWS: u32 = 2;

// ---------------------------------------------------------------------------
// Board contents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

impl Position {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub id: TileId,
    pub position: Position,
    pub elevation: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub id: PieceId,
    pub owner_id: UserId,
    pub tile_id: TileId,
}

/// A power either lies on a tile or is held by the piece that captured it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Power {
    pub id: PowerId,
    pub power_definition_id: String,
    pub tile_id: Option<TileId>,
    pub piece_id: Option<PieceId>,
    /// Players allowed to see and use this power, in capture order.
    pub authorized_player_ids: Vec<UserId>,
}

impl Power {
    /// A power lying on `tile`, not yet captured by anyone.
    pub fn on_tile(
        id: PowerId,
        definition: impl Into<String>,
        tile: TileId,
    ) -> Self {
        Self {
            id,
            power_definition_id: definition.into(),
            tile_id: Some(tile),
            piece_id: None,
            authorized_player_ids: Vec::new(),
        }
    }

    pub fn is_on_board(&self) -> bool {
        self.tile_id.is_some()
    }

    pub fn is_held(&self) -> bool {
        self.tile_id.is_none() && self.piece_id.is_some()
    }

    pub fn is_authorized(&self, user: &UserId) -> bool {
        self.authorized_player_ids.contains(user)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameBoard {
    pub tiles: BTreeMap<TileId, Tile>,
    pub pieces: BTreeMap<PieceId, Piece>,
    #[serde(default)]
    pub powers: BTreeMap<PowerId, Power>,
}

impl GameBoard {
    pub fn tile_at(&self, position: Position) -> Option<&Tile> {
        self.tiles.values().find(|t| t.position == position)
    }

    pub fn piece_on(&self, tile: &TileId) -> Option<&Piece> {
        self.pieces.values().find(|p| &p.tile_id == tile)
    }

    pub fn piece_at(&self, position: Position) -> Option<&Piece> {
        self.tile_at(position).and_then(|t| self.piece_on(&t.id))
    }

    /// Where a piece stands, if its tile exists.
    pub fn position_of(&self, piece: &PieceId) -> Option<Position> {
        let piece = self.pieces.get(piece)?;
        self.tiles.get(&piece.tile_id).map(|t| t.position)
    }

    /// Tiles with no piece and no uncaptured power on them, in id order.
    pub fn empty_tiles(&self) -> Vec<&TileId> {
        self.tiles
            .keys()
            .filter(|id| {
                !self.pieces.values().any(|p| &p.tile_id == *id)
                    && !self
                        .powers
                        .values()
                        .any(|w| w.tile_id.as_ref() == Some(*id))
            })
            .collect()
    }

    pub fn piece_count(&self, owner: &UserId) -> usize {
        self.pieces.values().filter(|p| &p.owner_id == owner).count()
    }
}

// ---------------------------------------------------------------------------
// Game state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSize {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    pub board_size: BoardSize,
}

/// Countdown to the next power spawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerSpawn {
    /// Moves left until powers appear.
    pub rounds: u32,
    /// How many powers appear then.
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub settings: GameSettings,
    pub board: GameBoard,
    pub current_player_id: UserId,
    pub next_power_spawn: PowerSpawn,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub winner_id: Option<UserId>,
    #[serde(default)]
    pub moves_played: u32,
}

/// Settings for new games.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub board_size: BoardSize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            board_size: BoardSize { x: 10, y: 8 },
        }
    }
}

impl GameConfig {
    pub fn board_size(mut self, x: u32, y: u32) -> Self {
        self.board_size = BoardSize { x, y };
        self
    }
}

impl GameState {
    /// A fresh game: every tile flat, `player_a` filling the first two rows
    /// and `player_b` the last two. `player_a` moves first.
    pub fn initial(
        player_a: &UserId,
        player_b: &UserId,
        config: &GameConfig,
    ) -> Self {
        let BoardSize { x: width, y: height } = config.board_size;
        let mut board = GameBoard::default();
        let mut tile_ids = BTreeMap::new();

        for x in 0..width {
            for y in 0..height {
                let tile = Tile {
                    id: TileId::random(),
                    position: Position::new(x, y),
                    elevation: 0,
                };
                tile_ids.insert((x, y), tile.id.clone());
                board.tiles.insert(tile.id.clone(), tile);
            }
        }

        let rows = STARTING_ROWS.min(height / 2);
        for x in 0..width {
            for y in 0..rows {
                for (owner, row) in
                    [(player_a, y), (player_b, y + height - rows)]
                {
                    let Some(tile_id) = tile_ids.get(&(x, row)) else {
                        continue;
                    };
                    let piece = Piece {
                        id: PieceId::random(),
                        owner_id: owner.clone(),
                        tile_id: tile_id.clone(),
                    };
                    board.pieces.insert(piece.id.clone(), piece);
                }
            }
        }

        Self {
            settings: GameSettings {
                board_size: config.board_size,
            },
            board,
            current_player_id: player_a.clone(),
            next_power_spawn: PowerSpawn::default(),
            finished: false,
            winner_id: None,
            moves_played: 0,
        }
    }

    /// Reads a state back from its persisted JSON form.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
