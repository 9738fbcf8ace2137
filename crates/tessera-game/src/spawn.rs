//! When and where new powers appear on the board.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Builder;

use crate::model::{GameState, Power, PowerId, PowerSpawn};
use crate::powers::PowerDefinitions;

/// Runs after every legal move that does not end the game.
pub trait SpawnPolicy: Send + 'static {
    fn after_move(&mut self, state: &mut GameState, powers: &PowerDefinitions);
}

/// Never spawns anything and leaves the countdown alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpawn;

impl SpawnPolicy for NoSpawn {
    fn after_move(&mut self, _state: &mut GameState, _powers: &PowerDefinitions) {}
}

/// Counts moves down and drops a batch of random powers on empty tiles
/// when the countdown hits zero.
///
/// The next countdown length is drawn from `1..=7`, weighted linearly
/// toward the long end; the batch size from `1..=3`.
#[derive(Debug, Clone)]
pub struct CountdownSpawn {
    rng: StdRng,
}

const MAX_ROUNDS: u32 = 7;
const MAX_COUNT: u32 = 3;

impl CountdownSpawn {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic spawning, for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn draw_next(&mut self) -> PowerSpawn {
        // Weight of `r` rounds is `r`.
        let total = MAX_ROUNDS * (MAX_ROUNDS + 1) / 2;
        let mut roll = self.rng.random_range(0..total);
        let mut rounds = 1;
        while roll >= rounds {
            roll -= rounds;
            rounds += 1;
        }
        PowerSpawn {
            rounds,
            count: self.rng.random_range(1..=MAX_COUNT),
        }
    }

    fn spawn_one(&mut self, state: &mut GameState, powers: &PowerDefinitions) -> bool {
        let empty = state.board.empty_tiles();
        if empty.is_empty() || powers.is_empty() {
            return false;
        }
        let tile = empty[self.rng.random_range(0..empty.len())].clone();
        let Some(definition) = powers.get(self.rng.random_range(0..powers.len())) else {
            return false;
        };
        let id = PowerId(Builder::from_random_bytes(self.rng.random()).into_uuid().to_string());
        tracing::debug!(power_id = %id, tile_id = %tile, definition = definition.id(), "power spawned");
        state
            .board
            .powers
            .insert(id.clone(), Power::on_tile(id, definition.id(), tile));
        true
    }
}

impl Default for CountdownSpawn {
    fn default() -> Self {
        Self::new()
    }
}

impl SpawnPolicy for CountdownSpawn {
    fn after_move(&mut self, state: &mut GameState, powers: &PowerDefinitions) {
        let spawn = &mut state.next_power_spawn;
        spawn.rounds = spawn.rounds.saturating_sub(1);
        if spawn.rounds > 0 {
            return;
        }
        let count = spawn.count;
        for _ in 0..count {
            if !self.spawn_one(state, powers) {
                break;
            }
        }
        state.next_power_spawn = self.draw_next();
    }
}
