//! Power definitions: what a captured power does when applied.
//!
//! The catalogue is built explicitly from an ordered list at startup.

use std::sync::Arc;

use crate::model::{GameState, PowerId};
use crate::rules::IllegalAction;

/// One kind of power.
pub trait PowerDefinition: Send + Sync + 'static {
    /// Stable identifier stored in [`crate::Power::power_definition_id`].
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Applies the power instance `power_id` to `state`.
    ///
    /// Called only for a held power the acting player may use. Any
    /// mutation happens on a scratch copy; returning an error discards it.
    fn apply(
        &self,
        state: &mut GameState,
        power_id: &PowerId,
    ) -> Result<(), IllegalAction>;
}

/// Raises the tile under the holding piece by one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RaiseTile;

impl PowerDefinition for RaiseTile {
    fn id(&self) -> &'static str {
        "raise_tile"
    }

    fn name(&self) -> &'static str {
        "Raise Tile"
    }

    fn description(&self) -> &'static str {
        "Raises the tile"
    }

    fn apply(
        &self,
        state: &mut GameState,
        power_id: &PowerId,
    ) -> Result<(), IllegalAction> {
        let board = &mut state.board;
        let piece_id = board
            .powers
            .get(power_id)
            .and_then(|p| p.piece_id.clone())
            .ok_or(IllegalAction::PowerNotHeld)?;
        let tile_id = board
            .pieces
            .get(&piece_id)
            .map(|p| p.tile_id.clone())
            .ok_or(IllegalAction::PieceNotFound)?;
        let tile = board
            .tiles
            .get_mut(&tile_id)
            .ok_or(IllegalAction::TileNotFound)?;
        tile.elevation += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

/// Ordered set of known power definitions.
#[derive(Clone, Default)]
pub struct PowerDefinitions {
    definitions: Vec<Arc<dyn PowerDefinition>>,
}

impl PowerDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every power that ships with the server.
    pub fn builtin() -> Self {
        Self::new().with(RaiseTile)
    }

    /// Adds `definition`, replacing any earlier one with the same id.
    pub fn with(mut self, definition: impl PowerDefinition) -> Self {
        self.definitions.retain(|d| d.id() != definition.id());
        self.definitions.push(Arc::new(definition));
        self
    }

    pub fn by_id(&self, id: &str) -> Option<&dyn PowerDefinition> {
        self.definitions
            .iter()
            .find(|d| d.id() == id)
            .map(|d| &**d)
    }

    /// Definitions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn PowerDefinition> {
        self.definitions.iter().map(|d| &**d)
    }

    pub fn get(&self, index: usize) -> Option<&dyn PowerDefinition> {
        self.definitions.get(index).map(|d| &**d)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl std::fmt::Debug for PowerDefinitions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.definitions.iter().map(|d| d.id()))
            .finish()
    }
}
